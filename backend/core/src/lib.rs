//! `voicenotes-core` — shared types for the voice notes service.

pub mod types;

pub use types::{NewVoiceNote, TranscriptionStatus, VoiceNote};
