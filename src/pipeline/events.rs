//! Pipeline progress events.
//!
//! Emitted over an mpsc channel so the CLI (or any other frontend) can
//! render progress without the engines knowing about terminals.

use crate::cost::StopReason;
use crate::models::QualityStatus;
use crate::rescan::RescanOutcome;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        total_pages: u64,
    },
    PageStarted {
        page_id: String,
    },
    PageAssessed {
        page_id: String,
        score: i32,
        status: QualityStatus,
    },
    PageRescanned {
        page_id: String,
        outcome: RescanOutcome,
    },
    PageCorrected {
        page_id: String,
        quality_score: i32,
        needs_review: bool,
    },
    PageDeferred {
        page_id: String,
        reason: String,
    },
    PageFailed {
        page_id: String,
        error: String,
    },
    /// Another worker or run holds the claim; the page was not touched.
    PageSkipped {
        page_id: String,
    },
    QueueEntryStarted {
        page_id: String,
        reason: String,
    },
    QueueEntryCompleted {
        page_id: String,
    },
    QueueEntryFailed {
        page_id: String,
        error: String,
    },
    RunStopped {
        reason: StopReason,
        in_flight_page: Option<String>,
    },
}
