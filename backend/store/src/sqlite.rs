//! SQLite-backed record store.
//!
//! A single `rusqlite::Connection` guarded by a `tokio::sync::Mutex` is shared
//! by the HTTP handlers and every background orchestrator run, so no writer
//! ever depends on a request-scoped handle. Status writes go through the
//! transition graph, which keeps terminal records immutable even if a stale
//! writer shows up late.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use voicenotes_core::{NewVoiceNote, TranscriptionStatus, VoiceNote};

use crate::record::RecordStore;

const SELECT_COLUMNS: &str = "id, title, description, file_path, file_name, file_size, \
     mime_type, duration, transcription_text, transcription_status, provider_job_id, \
     created_at, updated_at";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .context("Failed to open SQLite voice notes database")?;
        init_schema(&conn)?;
        info!(path = %path.as_ref().display(), "Voice note store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         CREATE TABLE IF NOT EXISTS voice_notes (
             id                   INTEGER PRIMARY KEY AUTOINCREMENT,
             title                TEXT NOT NULL,
             description          TEXT,
             file_path            TEXT NOT NULL,
             file_name            TEXT NOT NULL,
             file_size            INTEGER NOT NULL,
             mime_type            TEXT NOT NULL,
             duration             REAL,
             transcription_text   TEXT,
             transcription_status TEXT NOT NULL DEFAULT 'pending',
             provider_job_id      TEXT,
             created_at           TEXT NOT NULL,
             updated_at           TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_voice_notes_created ON voice_notes(created_at);
         CREATE INDEX IF NOT EXISTS idx_voice_notes_status ON voice_notes(transcription_status);",
    )
    .context("Failed to initialize voice_notes schema")?;
    Ok(())
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<VoiceNote> {
    let status: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(VoiceNote {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        file_path: row.get(3)?,
        file_name: row.get(4)?,
        file_size: row.get(5)?,
        mime_type: row.get(6)?,
        duration: row.get(7)?,
        transcription_text: row.get(8)?,
        transcription_status: TranscriptionStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                format!("unknown transcription status: {status}").into(),
            )
        })?,
        provider_job_id: row.get(10)?,
        created_at: parse_timestamp(11, &created_at)?,
        updated_at: parse_timestamp(12, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        })
}

fn current_status(conn: &Connection, id: i64) -> Result<Option<TranscriptionStatus>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT transcription_status FROM voice_notes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(raw.as_deref().and_then(TranscriptionStatus::parse))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, new: NewVoiceNote) -> Result<VoiceNote> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO voice_notes
               (title, description, file_path, file_name, file_size, mime_type, duration,
                transcription_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
            params![
                new.title,
                new.description,
                new.file_path,
                new.file_name,
                new.file_size,
                new.mime_type,
                new.duration,
                now,
            ],
        )
        .context("Failed to insert voice note")?;
        let id = conn.last_insert_rowid();

        let note = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM voice_notes WHERE id = ?1"),
            params![id],
            note_from_row,
        )?;
        debug!(id, "Voice note created");
        Ok(note)
    }

    async fn get(&self, id: i64) -> Result<Option<VoiceNote>> {
        let conn = self.conn.lock().await;
        let note = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM voice_notes WHERE id = ?1"),
                params![id],
                note_from_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(note)
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<VoiceNote>, u64)> {
        let conn = self.conn.lock().await;
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM voice_notes", [], |row| row.get(0))?;

        let offset = u64::from(page.saturating_sub(1)) * u64::from(per_page);
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM voice_notes
             ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let notes = stmt
            .query_map(params![per_page, offset], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read voice note page")?;
        Ok((notes, total))
    }

    async fn update_metadata(
        &self,
        id: i64,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Option<VoiceNote>> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE voice_notes SET
                 title = COALESCE(?2, title),
                 description = COALESCE(?3, description),
                 updated_at = ?4
             WHERE id = ?1",
            params![id, title, description, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let note = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM voice_notes WHERE id = ?1"),
            params![id],
            note_from_row,
        )?;
        Ok(Some(note))
    }

    async fn set_status(&self, id: i64, status: TranscriptionStatus) -> Result<bool> {
        let conn = self.conn.lock().await;
        let Some(current) = current_status(&conn, id)? else {
            return Ok(false);
        };
        if !current.can_transition_to(status) {
            debug!(id, from = %current, to = %status, "Rejected status transition");
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE voice_notes SET transcription_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now],
        )?;
        Ok(changed > 0)
    }

    async fn set_job_id(&self, id: i64, job_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        // Set-once: a record that already carries a job id keeps it.
        let changed = conn.execute(
            "UPDATE voice_notes SET provider_job_id = ?2, updated_at = ?3
             WHERE id = ?1 AND provider_job_id IS NULL",
            params![id, job_id, now],
        )?;
        Ok(changed > 0)
    }

    async fn complete(&self, id: i64, text: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let Some(current) = current_status(&conn, id)? else {
            return Ok(false);
        };
        if !current.can_transition_to(TranscriptionStatus::Completed) {
            debug!(id, from = %current, "Rejected completion of non-processing record");
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE voice_notes SET transcription_text = ?2,
                 transcription_status = 'completed', updated_at = ?3
             WHERE id = ?1",
            params![id, text, now],
        )?;
        Ok(changed > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM voice_notes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
