//! `voicenotes-transcriber` — drives a voice note through the transcription
//! lifecycle as a detached background task.
//!
//! One run per uploaded note: mark the record processing, upload the audio to
//! the provider, submit a job, then poll on a fixed interval until the
//! provider reports a terminal state or the attempt budget runs out. Every
//! outcome resolves to a terminal record status; nothing is propagated to the
//! request that triggered the upload.

pub mod cancel;
pub mod policy;
pub mod transcriber;

pub use cancel::{CancelToken, RunRegistry};
pub use policy::{Clock, PollPolicy, TokioClock};
pub use transcriber::{RunOutcome, Transcriber};
