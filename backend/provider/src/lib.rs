//! `voicenotes-provider` — HTTP client for the external speech-to-text service.
//!
//! Three single-round-trip operations: upload audio bytes, submit a
//! transcription job, poll a job. No retries live here; backoff and attempt
//! budgets are the orchestrator's concern so that policy exists in one place.

pub mod assemblyai;

pub use assemblyai::SpeechClient;

use async_trait::async_trait;

/// Transport/HTTP-layer failures against the provider.
///
/// Distinct from the provider reporting a legitimately errored job, which is
/// [`JobStatus::Errored`]. Each variant carries the provider's response body
/// or the underlying I/O error text for logging.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("audio upload failed: {0}")]
    UploadFailed(String),

    #[error("job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("job poll failed: {0}")]
    PollFailed(String),
}

/// Provider-reported state of a transcription job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed(String),
    Errored,
}

/// Abstraction over the provider's three wire operations, so the orchestrator
/// can be driven against a scripted implementation in tests.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Stream the file's bytes to the provider; returns an opaque audio reference.
    async fn upload_audio(&self, file_path: &str) -> Result<String, ProviderError>;

    /// Request transcription of an uploaded audio reference; returns the job id.
    async fn submit_job(&self, audio_url: &str) -> Result<String, ProviderError>;

    /// Fetch the current status (and text, once completed) of a job.
    async fn poll_job(&self, job_id: &str) -> Result<JobStatus, ProviderError>;
}
