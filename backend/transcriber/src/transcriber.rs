//! The transcription orchestrator.
//!
//! `Transcriber::start` spawns one detached task per uploaded voice note. The
//! task owns its own store handle (the shared `Arc<dyn RecordStore>`), never a
//! request-scoped one, and converts every failure mode into a `Failed` status
//! write. Nothing here is process-fatal.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use voicenotes_core::TranscriptionStatus;
use voicenotes_provider::{JobStatus, SpeechToText};
use voicenotes_store::RecordStore;

use crate::cancel::{CancelToken, RunRegistry};
use crate::policy::{Clock, PollPolicy, TokioClock};

/// How a single run ended. Only observed by logs and tests; callers of
/// [`Transcriber::start`] get nothing back by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Transcription text stored, record completed.
    Completed,
    /// Record marked failed (provider failure, errored job, or exhausted budget).
    Failed,
    /// The run was cancelled mid-flight; no further writes were made.
    Cancelled,
    /// The record was gone (or already terminal) before the run could act.
    Skipped,
}

pub struct Transcriber {
    store: Arc<dyn RecordStore>,
    provider: Arc<dyn SpeechToText>,
    registry: Arc<RunRegistry>,
    policy: PollPolicy,
    clock: Arc<dyn Clock>,
}

impl Transcriber {
    pub fn new(
        store: Arc<dyn RecordStore>,
        provider: Arc<dyn SpeechToText>,
        registry: Arc<RunRegistry>,
    ) -> Self {
        Self {
            store,
            provider,
            registry,
            policy: PollPolicy::default(),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fire-and-forget launch of a transcription run.
    ///
    /// Returns immediately; the run proceeds detached from the HTTP
    /// request/response cycle and reports nothing to the caller.
    pub fn start(self: &Arc<Self>, note_id: i64, file_path: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run(note_id, &file_path).await;
            debug!(note_id, ?outcome, "Transcription run finished");
        });
    }

    /// Run the full lifecycle for one voice note. Exposed for tests; `start`
    /// is the production entry point.
    pub async fn run(&self, note_id: i64, file_path: &str) -> RunOutcome {
        let token = self.registry.register(note_id);
        let outcome = match self.drive(note_id, file_path, &token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(note_id, error = %e, "Transcription run aborted by store error");
                // Best effort: leave the record in a terminal state. If this
                // write fails too, the record stays wherever it last was.
                if let Err(e) = self
                    .store
                    .set_status(note_id, TranscriptionStatus::Failed)
                    .await
                {
                    error!(note_id, error = %e, "Could not mark record failed");
                }
                RunOutcome::Failed
            }
        };
        self.registry.finish(note_id);
        outcome
    }

    async fn drive(
        &self,
        note_id: i64,
        file_path: &str,
        token: &CancelToken,
    ) -> Result<RunOutcome> {
        // The record may already be gone: the note was deleted before the
        // workflow began. Nothing to do, not an error.
        let Some(_note) = self.store.get(note_id).await? else {
            debug!(note_id, "Record vanished before transcription started");
            return Ok(RunOutcome::Skipped);
        };

        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        // Persist `processing` before any network call so concurrent readers
        // see the in-flight state immediately.
        if !self
            .store
            .set_status(note_id, TranscriptionStatus::Processing)
            .await?
        {
            debug!(note_id, "Record not in a runnable state");
            return Ok(RunOutcome::Skipped);
        }

        let audio_url = match self.provider.upload_audio(file_path).await {
            Ok(url) => url,
            Err(e) => return self.fail(note_id, token, &e).await,
        };

        let job_id = match self.provider.submit_job(&audio_url).await {
            Ok(id) => id,
            Err(e) => return self.fail(note_id, token, &e).await,
        };

        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        // Persisted before the first poll: the job id enables external
        // inspection and a future resume path.
        if !self.store.set_job_id(note_id, &job_id).await? {
            debug!(note_id, "Record vanished before job id could be stored");
            return Ok(RunOutcome::Skipped);
        }
        info!(note_id, job_id = %job_id, "Transcription job submitted, polling");

        for attempt in 1..=self.policy.max_attempts {
            match self.provider.poll_job(&job_id).await {
                Ok(JobStatus::Completed(text)) => {
                    if token.is_cancelled() {
                        return Ok(RunOutcome::Cancelled);
                    }
                    return if self.store.complete(note_id, &text).await? {
                        info!(note_id, attempt, chars = text.len(), "Transcription completed");
                        Ok(RunOutcome::Completed)
                    } else {
                        debug!(note_id, "Record vanished before completion write");
                        Ok(RunOutcome::Skipped)
                    };
                }
                Ok(JobStatus::Errored) => {
                    return self
                        .fail(note_id, token, &"provider reported an errored job")
                        .await;
                }
                Err(e) => return self.fail(note_id, token, &e).await,
                Ok(JobStatus::Queued) | Ok(JobStatus::Processing) => {}
            }

            if attempt < self.policy.max_attempts {
                tokio::select! {
                    _ = self.clock.sleep(self.policy.interval) => {}
                    _ = token.cancelled() => {
                        debug!(note_id, "Run cancelled while waiting between polls");
                        return Ok(RunOutcome::Cancelled);
                    }
                }
            }
        }

        self.fail(note_id, token, &"poll budget exhausted").await
    }

    /// Convert any failure into a terminal `Failed` status. The reason is
    /// logged, not persisted; the stored record only carries the enum.
    async fn fail(
        &self,
        note_id: i64,
        token: &CancelToken,
        reason: &(dyn std::fmt::Display + Sync),
    ) -> Result<RunOutcome> {
        warn!(note_id, %reason, "Transcription failed");
        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store
            .set_status(note_id, TranscriptionStatus::Failed)
            .await?;
        Ok(RunOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use voicenotes_core::NewVoiceNote;
    use voicenotes_provider::ProviderError;
    use voicenotes_store::SqliteRecordStore;

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            max_attempts,
            interval: Duration::from_millis(1),
        }
    }

    async fn seed_note(store: &SqliteRecordStore, title: &str) -> i64 {
        store
            .create(NewVoiceNote {
                title: title.to_string(),
                description: None,
                file_path: format!("/tmp/{title}.mp3"),
                file_name: format!("{title}.mp3"),
                file_size: 64,
                mime_type: "audio/mpeg".to_string(),
                duration: None,
            })
            .await
            .unwrap()
            .id
    }

    /// Scripted provider: fixed upload/submit outcomes plus a queue of poll
    /// results (defaulting to `Processing` once the queue is drained).
    #[derive(Default)]
    struct FakeProvider {
        fail_upload: bool,
        fail_submit: bool,
        polls: Mutex<VecDeque<Result<JobStatus, ProviderError>>>,
        upload_calls: AtomicU32,
        submit_calls: AtomicU32,
        poll_calls: AtomicU32,
    }

    impl FakeProvider {
        fn with_polls(polls: Vec<Result<JobStatus, ProviderError>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SpeechToText for FakeProvider {
        async fn upload_audio(&self, _file_path: &str) -> Result<String, ProviderError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_upload {
                Err(ProviderError::UploadFailed("HTTP 503: upstream down".into()))
            } else {
                Ok("https://cdn.example/audio/1".to_string())
            }
        }

        async fn submit_job(&self, _audio_url: &str) -> Result<String, ProviderError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_submit {
                Err(ProviderError::SubmissionFailed("HTTP 400: bad audio".into()))
            } else {
                Ok("job-123".to_string())
            }
        }

        async fn poll_job(&self, _job_id: &str) -> Result<JobStatus, ProviderError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(JobStatus::Processing))
        }
    }

    fn transcriber(
        store: &Arc<SqliteRecordStore>,
        provider: Arc<dyn SpeechToText>,
        max_attempts: u32,
    ) -> Transcriber {
        let registry = Arc::new(RunRegistry::new());
        Transcriber::new(
            Arc::clone(store) as Arc<dyn RecordStore>,
            provider,
            registry,
        )
        .with_policy(fast_policy(max_attempts))
    }

    #[tokio::test]
    async fn upload_failure_marks_failed_with_no_job_id() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider {
            fail_upload: true,
            ..Default::default()
        });

        let outcome = transcriber(&store, provider.clone(), 60)
            .run(id, "/tmp/memo.mp3")
            .await;

        assert_eq!(outcome, RunOutcome::Failed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Failed);
        assert!(note.provider_job_id.is_none());
        assert!(note.transcription_text.is_none());
        assert_eq!(provider.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_failure_marks_failed_with_no_job_id() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider {
            fail_submit: true,
            ..Default::default()
        });

        let outcome = transcriber(&store, provider.clone(), 60)
            .run(id, "/tmp/memo.mp3")
            .await;

        assert_eq!(outcome, RunOutcome::Failed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Failed);
        assert!(note.provider_job_id.is_none());
        assert_eq!(provider.poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completes_on_third_attempt_and_stops_polling() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider::with_polls(vec![
            Ok(JobStatus::Queued),
            Ok(JobStatus::Processing),
            Ok(JobStatus::Completed("hello world".to_string())),
        ]));

        let outcome = transcriber(&store, provider.clone(), 60)
            .run(id, "/tmp/memo.mp3")
            .await;

        assert_eq!(outcome, RunOutcome::Completed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Completed);
        assert_eq!(note.transcription_text.as_deref(), Some("hello world"));
        assert_eq!(note.provider_job_id.as_deref(), Some("job-123"));
        assert_eq!(provider.poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_poll_budget_marks_failed() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        // Empty script: every poll reports Processing.
        let provider = Arc::new(FakeProvider::default());

        let outcome = transcriber(&store, provider.clone(), 60)
            .run(id, "/tmp/memo.mp3")
            .await;

        assert_eq!(outcome, RunOutcome::Failed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Failed);
        assert!(note.transcription_text.is_none());
        assert_eq!(provider.poll_calls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test]
    async fn provider_errored_job_marks_failed() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider::with_polls(vec![Ok(JobStatus::Errored)]));

        let outcome = transcriber(&store, provider, 60).run(id, "/tmp/memo.mp3").await;
        assert_eq!(outcome, RunOutcome::Failed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Failed);
        assert_eq!(note.provider_job_id.as_deref(), Some("job-123"));
    }

    #[tokio::test]
    async fn poll_transport_failure_marks_failed() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider::with_polls(vec![Err(
            ProviderError::PollFailed("HTTP 500: boom".into()),
        )]));

        let outcome = transcriber(&store, provider, 60).run(id, "/tmp/memo.mp3").await;
        assert_eq!(outcome, RunOutcome::Failed);
    }

    #[tokio::test]
    async fn missing_record_is_a_silent_noop() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let provider = Arc::new(FakeProvider::default());

        let outcome = transcriber(&store, provider.clone(), 60)
            .run(999, "/tmp/gone.mp3")
            .await;

        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(provider.upload_calls.load(Ordering::SeqCst), 0);
        let (notes, total) = store.list(1, 10).await.unwrap();
        assert!(notes.is_empty());
        assert_eq!(total, 0);
    }

    /// Provider that inspects the store from inside `poll_job`, proving the
    /// job id is persisted before the first poll goes out.
    struct JobIdProbe {
        store: Arc<SqliteRecordStore>,
        note_id: i64,
    }

    #[async_trait]
    impl SpeechToText for JobIdProbe {
        async fn upload_audio(&self, _file_path: &str) -> Result<String, ProviderError> {
            Ok("https://cdn.example/audio/2".to_string())
        }

        async fn submit_job(&self, _audio_url: &str) -> Result<String, ProviderError> {
            Ok("job-probe".to_string())
        }

        async fn poll_job(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
            let note = self.store.get(self.note_id).await.unwrap().unwrap();
            assert_eq!(note.provider_job_id.as_deref(), Some(job_id));
            Ok(JobStatus::Completed("done".to_string()))
        }
    }

    #[tokio::test]
    async fn job_id_is_persisted_before_first_poll() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(JobIdProbe {
            store: Arc::clone(&store),
            note_id: id,
        });

        let outcome = transcriber(&store, provider, 60).run(id, "/tmp/memo.mp3").await;
        assert_eq!(outcome, RunOutcome::Completed);
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.provider_job_id.as_deref(), Some("job-probe"));
    }

    /// Clock that cancels the run's registry entry instead of sleeping, then
    /// pends forever so the cancellation branch of the select fires.
    struct CancellingClock {
        registry: Arc<RunRegistry>,
        note_id: i64,
    }

    #[async_trait]
    impl Clock for CancellingClock {
        async fn sleep(&self, _duration: Duration) {
            self.registry.cancel(self.note_id);
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn cancellation_between_polls_stops_without_further_writes() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id = seed_note(&store, "memo").await;
        let provider = Arc::new(FakeProvider::default());
        let registry = Arc::new(RunRegistry::new());
        let transcriber = Transcriber::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            provider.clone(),
            Arc::clone(&registry),
        )
        .with_policy(fast_policy(60))
        .with_clock(Arc::new(CancellingClock {
            registry: Arc::clone(&registry),
            note_id: id,
        }));

        let outcome = transcriber.run(id, "/tmp/memo.mp3").await;

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(provider.poll_calls.load(Ordering::SeqCst), 1);
        // The record stays where the run left it; the delete that triggered
        // the cancel removes it afterwards.
        let note = store.get(id).await.unwrap().unwrap();
        assert_eq!(note.transcription_status, TranscriptionStatus::Processing);
    }

    #[tokio::test]
    async fn concurrent_runs_touch_only_their_own_records() {
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        let id_a = seed_note(&store, "alpha").await;
        let id_b = seed_note(&store, "beta").await;

        let ok_provider = Arc::new(FakeProvider::with_polls(vec![Ok(JobStatus::Completed(
            "alpha text".to_string(),
        ))]));
        let bad_provider = Arc::new(FakeProvider {
            fail_upload: true,
            ..Default::default()
        });

        let t_a = transcriber(&store, ok_provider, 60);
        let t_b = transcriber(&store, bad_provider, 60);
        let (out_a, out_b) =
            tokio::join!(t_a.run(id_a, "/tmp/alpha.mp3"), t_b.run(id_b, "/tmp/beta.mp3"));

        assert_eq!(out_a, RunOutcome::Completed);
        assert_eq!(out_b, RunOutcome::Failed);

        let note_a = store.get(id_a).await.unwrap().unwrap();
        let note_b = store.get(id_b).await.unwrap().unwrap();
        assert_eq!(note_a.transcription_status, TranscriptionStatus::Completed);
        assert_eq!(note_a.transcription_text.as_deref(), Some("alpha text"));
        assert_eq!(note_b.transcription_status, TranscriptionStatus::Failed);
        assert!(note_b.transcription_text.is_none());
    }
}
