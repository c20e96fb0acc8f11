use anyhow::Result;
use async_trait::async_trait;

use voicenotes_core::{NewVoiceNote, TranscriptionStatus, VoiceNote};

/// Abstract interface for voice note persistence.
///
/// The orchestrator mutates records exclusively through this trait and never
/// holds a private copy of a record across await points; the store is the
/// single source of truth shared with the HTTP read path.
///
/// Mutators return `Ok(false)` when the record is missing or the status
/// transition graph rejects the write (the record already reached a terminal
/// state). Callers treat `false` as "nothing to do", not as an error.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record with status `Pending` and return it.
    async fn create(&self, new: NewVoiceNote) -> Result<VoiceNote>;

    /// Fetch a record by id.
    async fn get(&self, id: i64) -> Result<Option<VoiceNote>>;

    /// Page through records, newest first. Returns the page and the total count.
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<VoiceNote>, u64)>;

    /// Update title/description. Returns the updated record, `None` if missing.
    async fn update_metadata(
        &self,
        id: i64,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Option<VoiceNote>>;

    /// Move the record to `status` if the transition graph allows it.
    async fn set_status(&self, id: i64, status: TranscriptionStatus) -> Result<bool>;

    /// Record the provider-assigned job id. Set exactly once.
    async fn set_job_id(&self, id: i64, job_id: &str) -> Result<bool>;

    /// Store the transcription text and move to `Completed` in one write.
    async fn complete(&self, id: i64, text: &str) -> Result<bool>;

    /// Delete a record. Returns whether a row existed.
    async fn delete(&self, id: i64) -> Result<bool>;
}
