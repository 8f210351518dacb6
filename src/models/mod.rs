//! Domain models shared across the pipeline engines.

mod correction;
mod ledger;
mod page;
mod queue;

pub use correction::{Confidence, CorrectionAssessment, CorrectionRecord, ImprovementLevel};
pub use ledger::{BilledOperation, LedgerEntry};
pub use page::{Page, QualityStatus};
pub use queue::{QueueStatus, ReprocessEntry};
