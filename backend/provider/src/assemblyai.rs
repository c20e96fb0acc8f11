//! AssemblyAI speech-to-text client.
//!
//! Wire contract: POST raw bytes to `/upload` returning `{upload_url}`,
//! POST `/transcript` with `{audio_url, language_detection}` returning `{id}`,
//! GET `/transcript/{id}` returning `{status, text?}` with
//! `status ∈ {queued, processing, completed, error}`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{JobStatus, ProviderError, SpeechToText};

const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com/v2";

/// Per-request transport timeout. Upload and submit calls are otherwise
/// unbounded; the poll budget alone must not be the only ceiling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    status: String,
    text: Option<String>,
}

impl TranscriptResponse {
    fn into_job_status(self) -> Result<JobStatus, ProviderError> {
        match self.status.as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed(self.text.unwrap_or_default())),
            "error" => Ok(JobStatus::Errored),
            other => Err(ProviderError::PollFailed(format!(
                "unexpected job status: {other}"
            ))),
        }
    }
}

/// AssemblyAI API client.
pub struct SpeechClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl SpeechClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build provider HTTP client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechToText for SpeechClient {
    async fn upload_audio(&self, file_path: &str) -> Result<String, ProviderError> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| ProviderError::UploadFailed(format!("read {file_path}: {e}")))?;
        debug!(file_path, size = bytes.len(), "Uploading audio to provider");

        let resp = self
            .http
            .post(format!("{}/upload", self.base_url))
            .header("authorization", &self.api_key)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ProviderError::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::UploadFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: UploadResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::UploadFailed(format!("invalid upload response: {e}")))?;
        Ok(parsed.upload_url)
    }

    async fn submit_job(&self, audio_url: &str) -> Result<String, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&serde_json::json!({
                "audio_url": audio_url,
                "language_detection": true,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::SubmissionFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::SubmissionFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: SubmitResponse = resp.json().await.map_err(|e| {
            ProviderError::SubmissionFailed(format!("invalid submit response: {e}"))
        })?;
        debug!(job_id = %parsed.id, "Transcription job accepted");
        Ok(parsed.id)
    }

    async fn poll_job(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/transcript/{job_id}", self.base_url))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::PollFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::PollFailed(format!("HTTP {status}: {body}")));
        }

        let parsed: TranscriptResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::PollFailed(format!("invalid poll response: {e}")))?;
        parsed.into_job_status()
    }
}
