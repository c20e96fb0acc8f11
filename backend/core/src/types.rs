use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a voice note's transcription.
///
/// Transitions are monotonic: `Pending → Processing → {Completed, Failed}`.
/// A terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the transition graph permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed),
            Self::Processing => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored audio upload plus its metadata and transcription result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceNote {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub duration: Option<f64>,
    pub transcription_text: Option<String>,
    pub transcription_status: TranscriptionStatus,
    pub provider_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the upload handler when creating a record.
/// The store assigns the id, timestamps, and initial `Pending` status.
#[derive(Debug, Clone)]
pub struct NewVoiceNote {
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_admit_no_transitions() {
        for next in [
            TranscriptionStatus::Pending,
            TranscriptionStatus::Processing,
            TranscriptionStatus::Completed,
            TranscriptionStatus::Failed,
        ] {
            assert!(!TranscriptionStatus::Completed.can_transition_to(next));
            assert!(!TranscriptionStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn forward_transitions_allowed() {
        assert!(TranscriptionStatus::Pending.can_transition_to(TranscriptionStatus::Processing));
        assert!(TranscriptionStatus::Processing.can_transition_to(TranscriptionStatus::Completed));
        assert!(TranscriptionStatus::Processing.can_transition_to(TranscriptionStatus::Failed));
        assert!(!TranscriptionStatus::Processing.can_transition_to(TranscriptionStatus::Pending));
        assert!(!TranscriptionStatus::Pending.can_transition_to(TranscriptionStatus::Completed));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TranscriptionStatus::Pending,
            TranscriptionStatus::Processing,
            TranscriptionStatus::Completed,
            TranscriptionStatus::Failed,
        ] {
            assert_eq!(TranscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TranscriptionStatus::parse("bogus"), None);
    }
}
