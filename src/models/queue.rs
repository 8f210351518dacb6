//! Reprocessing queue models.
//!
//! The queue is the backlog of pages whose OCR was judged unusable and which
//! need a higher-effort pass outside the standard rescan loop. At most one
//! active entry exists per page; enqueueing is idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queue entry. Moves forward only, except for the
/// manual `failed -> queued` retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// An entry counts against the one-active-per-page invariant while it is
    /// queued or being processed.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// A work item in the reprocessing queue.
#[derive(Debug, Clone)]
pub struct ReprocessEntry {
    pub id: i64,
    pub page_id: String,
    pub reason: String,
    /// Higher is more urgent.
    pub priority: i32,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(QueueStatus::Queued.is_active());
        assert!(QueueStatus::Processing.is_active());
        assert!(!QueueStatus::Completed.is_active());
        assert!(!QueueStatus::Failed.is_active());
    }
}
