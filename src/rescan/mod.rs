//! Rescan engine.
//!
//! Drives bounded reprocessing of low-quality pages through the strategy
//! ladder. Each attempt re-extracts with a different OCR configuration,
//! validates the replacement, and re-assesses. The attempt counter lives in
//! the page row and the canonical text is replaced atomically, so a crash
//! anywhere in an attempt is invisible: the same attempt index simply runs
//! again.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::{Page, QualityStatus};
use crate::ocr::{OcrEngine, RescanStrategy};
use crate::quality::QualityAssessor;
use crate::repository::{PageRepository, ReprocessQueueRepository};
use crate::storage::TextStore;

/// Result of running the rescan engine on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// Page was already settled; nothing was done.
    Skipped,
    /// A rescan produced acceptable text.
    Accepted { score: i32 },
    /// Attempt budget exhausted; page is failed and routed to a human.
    Exhausted,
}

/// Queue priority for pages that ran out of rescan attempts.
const EXHAUSTED_PRIORITY: i32 = 10;

pub struct RescanEngine {
    pages: PageRepository,
    queue: ReprocessQueueRepository,
    store: TextStore,
    engine: Arc<dyn OcrEngine>,
    assessor: Arc<QualityAssessor>,
    max_attempts: i32,
}

impl RescanEngine {
    pub fn new(
        pages: PageRepository,
        queue: ReprocessQueueRepository,
        store: TextStore,
        engine: Arc<dyn OcrEngine>,
        assessor: Arc<QualityAssessor>,
        max_attempts: i32,
    ) -> Self {
        Self {
            pages,
            queue,
            store,
            engine,
            assessor,
            max_attempts,
        }
    }

    /// Validate a replacement: must be non-degenerate and no shorter than
    /// the text it would replace.
    fn accept_replacement(&self, new_text: &str, old_text: &str) -> bool {
        let new_trimmed = new_text.trim();
        if new_trimmed.is_empty() || self.assessor.is_degenerate(new_text) {
            return false;
        }
        new_trimmed.chars().count() >= old_text.trim().chars().count()
    }

    /// Run one OCR extraction on a blocking thread.
    async fn extract(
        &self,
        page: &Page,
        strategy: RescanStrategy,
    ) -> anyhow::Result<Result<String, crate::ocr::OcrError>> {
        let image = self.store.resolve(&page.image_path);
        let engine = self.engine.clone();
        Ok(tokio::task::spawn_blocking(move || engine.extract(&image, strategy)).await?)
    }

    /// Drive a `needs_rescan` page through the strategy ladder until it is
    /// acceptable or the attempt budget runs out.
    ///
    /// Re-invoking on an `acceptable` or `failed` page is a no-op; the check
    /// happens before any work. The counter is advanced on every attempt,
    /// accepted or rejected, so the cap holds across crashes and reruns.
    pub async fn run(&self, page_id: &str) -> anyhow::Result<RescanOutcome> {
        let Some(mut page) = self.pages.get(page_id).await? else {
            anyhow::bail!("page not found: {}", page_id);
        };

        if page.quality_status != QualityStatus::NeedsRescan {
            debug!(
                "Rescan skipped for {}: status {}",
                page.id,
                page.quality_status.as_str()
            );
            return Ok(RescanOutcome::Skipped);
        }

        while page.rescan_attempts < self.max_attempts {
            let Some(strategy) = RescanStrategy::for_attempt(page.rescan_attempts) else {
                break;
            };
            let attempt_number = page.rescan_attempts + 1;
            info!(
                "Rescanning {} (attempt {}/{}, strategy {})",
                page.id,
                attempt_number,
                self.max_attempts,
                strategy.as_str()
            );

            let old_text = match &page.text_path {
                Some(path) => self.store.read(path)?.unwrap_or_default(),
                None => String::new(),
            };

            match self.extract(&page, strategy).await? {
                Ok(new_text) if self.accept_replacement(&new_text, &old_text) => {
                    let text_path = page
                        .text_path
                        .clone()
                        .unwrap_or_else(|| TextStore::text_path_for_image(&page.image_path));
                    // Durable file first, then the row that points at it.
                    self.store.write_atomic(&text_path, &new_text)?;
                    let hash = TextStore::content_hash(&new_text);
                    self.pages
                        .record_rescan(&page.id, &text_path, &hash, attempt_number)
                        .await?;

                    let verdict = self.assessor.assess(&page.id, &new_text).await;
                    self.pages
                        .set_quality(&page.id, verdict.score, verdict.status)
                        .await?;

                    if verdict.status == QualityStatus::Acceptable {
                        info!(
                            "Rescan of {} accepted on attempt {} ({} chars)",
                            page.id,
                            attempt_number,
                            new_text.trim().chars().count()
                        );
                        return Ok(RescanOutcome::Accepted {
                            score: verdict.score,
                        });
                    }
                }
                Ok(rejected) => {
                    debug!(
                        "Rescan attempt {} for {} rejected ({} chars, prior {})",
                        attempt_number,
                        page.id,
                        rejected.trim().chars().count(),
                        old_text.trim().chars().count()
                    );
                    self.pages.record_attempt(&page.id, attempt_number).await?;
                }
                Err(e) => {
                    warn!(
                        "Rescan attempt {} for {} failed: {}",
                        attempt_number, page.id, e
                    );
                    self.pages.record_attempt(&page.id, attempt_number).await?;
                }
            }

            page = self
                .pages
                .get(page_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("page disappeared: {}", page_id))?;

            if page.quality_status != QualityStatus::NeedsRescan {
                // Another path settled the page while we were extracting.
                return Ok(RescanOutcome::Skipped);
            }
        }

        // Budget spent and still failing: terminal, humans take over.
        if self.pages.mark_failed(&page.id).await? {
            self.queue
                .enqueue(&page.id, "rescan budget exhausted", EXHAUSTED_PRIORITY)
                .await?;
            info!(
                "Page {} failed after {} rescan attempts; flagged for review",
                page.id, page.rescan_attempts
            );
        }

        Ok(RescanOutcome::Exhausted)
    }
}
