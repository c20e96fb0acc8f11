//! `voicenotes-store` — durable storage for voice note records.
//!
//! Exposes the [`RecordStore`] trait consumed by the HTTP layer and the
//! transcription orchestrator, plus a SQLite-backed implementation.

pub mod record;
pub mod sqlite;

pub use record::RecordStore;
pub use sqlite::SqliteRecordStore;
