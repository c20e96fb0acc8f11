use std::time::Duration;

use async_trait::async_trait;

/// Fixed-interval polling budget for one transcription run.
///
/// The budget is the only ceiling on a stalled provider job: once
/// `max_attempts` polls have returned a non-terminal status, the run gives up
/// and marks the record failed rather than leaving it pending forever.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        // 60 attempts x 5s = a 5 minute total budget.
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    /// Total wall-clock budget the policy allows.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Injectable sleep so the poll loop is testable without real waits.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
