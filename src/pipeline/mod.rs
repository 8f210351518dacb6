//! Batch pipeline driver.
//!
//! Pulls pending pages from the store, claims each one, and drives it
//! through assess -> rescan -> correct with a fixed-size worker pool.
//! A cooperative stop flag is checked between pages: the daily rate limit
//! and the budget ceiling set it, in-flight pages finish, and nothing new
//! starts. Overlapping runs coexist because every page is claimed with a
//! compare-and-set before any work happens.

mod events;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::correction::{CorrectionEngine, CorrectionOutcome};
use crate::cost::StopReason;
use crate::models::{Page, QualityStatus};
use crate::ocr::{OcrEngine, RescanStrategy};
use crate::quality::QualityAssessor;
use crate::repository::{
    CorrectionRepository, PageRepository, ReprocessQueueRepository,
};
use crate::rescan::{RescanEngine, RescanOutcome};
use crate::storage::TextStore;

pub use events::PipelineEvent;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Assess, rescan, and correct.
    Full,
    /// Assess and rescan only (no billed correction calls).
    ScanOnly,
    /// Correction only, for pages already assessed acceptable.
    CorrectOnly,
}

/// Counts for one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Pages claimed and driven through the pipeline.
    pub processed: usize,
    /// Pages that ended acceptable (with or without rescanning).
    pub accepted: usize,
    /// Pages that exhausted the rescan budget and failed.
    pub rescan_failed: usize,
    /// Pages with a new correction record.
    pub corrected: usize,
    /// Pages deferred to a later run.
    pub deferred: usize,
    /// Pages that errored.
    pub errors: usize,
    /// Set when the run stopped early (daily limit or budget ceiling).
    pub stopped: Option<StopReason>,
}

/// Counts for one queue drain.
#[derive(Debug, Default, Clone)]
pub struct DrainSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Outcome of one page's trip through the pipeline.
enum PageOutcome {
    Accepted,
    RescanExhausted,
    Corrected,
    Deferred(String),
    Settled,
    Stopped(StopReason),
}

#[derive(Clone)]
pub struct PipelineService {
    pages: PageRepository,
    corrections: CorrectionRepository,
    queue: ReprocessQueueRepository,
    store: TextStore,
    assessor: Arc<QualityAssessor>,
    rescan: Arc<RescanEngine>,
    correction: Option<Arc<CorrectionEngine>>,
    ocr: Arc<dyn OcrEngine>,
    workers: usize,
    claim_ttl: chrono::Duration,
}

impl PipelineService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pages: PageRepository,
        corrections: CorrectionRepository,
        queue: ReprocessQueueRepository,
        store: TextStore,
        assessor: Arc<QualityAssessor>,
        rescan: Arc<RescanEngine>,
        correction: Option<Arc<CorrectionEngine>>,
        ocr: Arc<dyn OcrEngine>,
        workers: usize,
        claim_ttl: chrono::Duration,
    ) -> Self {
        Self {
            pages,
            corrections,
            queue,
            store,
            assessor,
            rescan,
            correction,
            ocr,
            workers: workers.max(1),
            claim_ttl,
        }
    }

    /// Canonical text for a page, empty when nothing is stored yet.
    fn read_text(&self, page: &Page) -> std::io::Result<String> {
        let path = page
            .text_path
            .clone()
            .unwrap_or_else(|| TextStore::text_path_for_image(&page.image_path));
        Ok(self.store.read(&path)?.unwrap_or_default())
    }

    async fn fetch_batch(
        &self,
        mode: PipelineMode,
        limit: usize,
    ) -> anyhow::Result<Vec<Page>> {
        let mut batch = match mode {
            PipelineMode::ScanOnly => self.pages.get_needing_scan(limit, self.claim_ttl).await?,
            PipelineMode::CorrectOnly => {
                self.pages
                    .get_needing_correction(limit, self.claim_ttl)
                    .await?
            }
            PipelineMode::Full => {
                let mut pages = self.pages.get_needing_scan(limit, self.claim_ttl).await?;
                if self.correction.is_some() && pages.len() < limit {
                    let ids: HashSet<String> = pages.iter().map(|p| p.id.clone()).collect();
                    let extra = self
                        .pages
                        .get_needing_correction(limit - pages.len(), self.claim_ttl)
                        .await?;
                    pages.extend(extra.into_iter().filter(|p| !ids.contains(&p.id)));
                }
                pages
            }
        };
        batch.truncate(limit);
        Ok(batch)
    }

    /// Run the pipeline over all pending pages (or up to `limit` pages).
    pub async fn run(
        &self,
        mode: PipelineMode,
        limit: usize,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<RunSummary> {
        // Approximate count for progress display; the real work list is
        // whatever the batches keep yielding.
        let counts = self.pages.counts_by_status().await?;
        let mut total = 0u64;
        if mode != PipelineMode::CorrectOnly {
            total += counts.get(&QualityStatus::Unchecked).copied().unwrap_or(0);
            total += counts.get(&QualityStatus::NeedsRescan).copied().unwrap_or(0);
        }
        if mode != PipelineMode::ScanOnly && self.correction.is_some() {
            total += counts
                .get(&QualityStatus::NeedsCorrection)
                .copied()
                .unwrap_or(0);
        }
        let _ = event_tx
            .send(PipelineEvent::RunStarted {
                total_pages: if limit > 0 {
                    total.min(limit as u64)
                } else {
                    total
                },
            })
            .await;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_reason: Arc<Mutex<Option<StopReason>>> = Arc::new(Mutex::new(None));
        let processed = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));
        let rescan_failed = Arc::new(AtomicUsize::new(0));
        let corrected = Arc::new(AtomicUsize::new(0));
        let deferred = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let mut seen: HashSet<String> = HashSet::new();
        let batch_size = self.workers * 4;

        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if limit > 0 && processed.load(Ordering::SeqCst) >= limit {
                break;
            }

            let mut batch = self.fetch_batch(mode, batch_size).await?;
            batch.retain(|p| !seen.contains(&p.id));
            if batch.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(self.workers);

            for page in batch {
                // Cooperative stop: in-flight pages finish (drained below),
                // nothing new starts.
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if limit > 0 && processed.load(Ordering::SeqCst) >= limit {
                    break;
                }

                seen.insert(page.id.clone());

                // The claim is the mutual-exclusion point: a page another
                // run holds is simply skipped, never waited on.
                if !self.pages.claim(&page.id, self.claim_ttl).await? {
                    let _ = event_tx
                        .send(PipelineEvent::PageSkipped {
                            page_id: page.id.clone(),
                        })
                        .await;
                    continue;
                }

                processed.fetch_add(1, Ordering::SeqCst);

                let service = self.clone();
                let event_tx = event_tx.clone();
                let stop = stop.clone();
                let stop_reason = stop_reason.clone();
                let accepted = accepted.clone();
                let rescan_failed = rescan_failed.clone();
                let corrected = corrected.clone();
                let deferred = deferred.clone();
                let errors = errors.clone();

                let handle = tokio::spawn(async move {
                    let page_id = page.id.clone();
                    let _ = event_tx
                        .send(PipelineEvent::PageStarted {
                            page_id: page_id.clone(),
                        })
                        .await;

                    let outcome = service.process_page(&page, mode, &event_tx).await;

                    match outcome {
                        Ok(PageOutcome::Accepted) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(PageOutcome::RescanExhausted) => {
                            rescan_failed.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(PageOutcome::Corrected) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                            corrected.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(PageOutcome::Deferred(reason)) => {
                            deferred.fetch_add(1, Ordering::SeqCst);
                            let _ = event_tx
                                .send(PipelineEvent::PageDeferred {
                                    page_id: page_id.clone(),
                                    reason,
                                })
                                .await;
                        }
                        Ok(PageOutcome::Settled) => {}
                        Ok(PageOutcome::Stopped(reason)) => {
                            // First stop reason wins; everything after just
                            // stops picking up work.
                            stop.store(true, Ordering::SeqCst);
                            let is_first = {
                                let mut guard = stop_reason.lock().expect("stop reason lock");
                                if guard.is_none() {
                                    *guard = Some(reason);
                                    true
                                } else {
                                    false
                                }
                            };
                            if is_first {
                                let _ = event_tx
                                    .send(PipelineEvent::RunStopped {
                                        reason,
                                        in_flight_page: Some(page_id.clone()),
                                    })
                                    .await;
                            }
                        }
                        Err(e) => {
                            errors.fetch_add(1, Ordering::SeqCst);
                            warn!("Processing failed for {}: {}", page_id, e);
                            let _ = event_tx
                                .send(PipelineEvent::PageFailed {
                                    page_id: page_id.clone(),
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }

                    if let Err(e) = service.pages.release(&page_id).await {
                        warn!("Failed to release claim on {}: {}", page_id, e);
                    }
                });

                handles.push(handle);

                if handles.len() >= self.workers {
                    for h in handles.drain(..) {
                        let _ = h.await;
                    }
                }
            }

            for h in handles {
                let _ = h.await;
            }
        }

        let stopped = *stop_reason.lock().expect("stop reason lock");
        Ok(RunSummary {
            processed: processed.load(Ordering::SeqCst),
            accepted: accepted.load(Ordering::SeqCst),
            rescan_failed: rescan_failed.load(Ordering::SeqCst),
            corrected: corrected.load(Ordering::SeqCst),
            deferred: deferred.load(Ordering::SeqCst),
            errors: errors.load(Ordering::SeqCst),
            stopped,
        })
    }

    /// One page's trip: assess, rescan while needed, then optionally correct.
    async fn process_page(
        &self,
        page: &Page,
        mode: PipelineMode,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<PageOutcome> {
        let mut outcome = PageOutcome::Settled;

        if mode != PipelineMode::CorrectOnly
            && matches!(
                page.quality_status,
                QualityStatus::Unchecked | QualityStatus::NeedsRescan
            )
        {
            let text = self.read_text(page)?;
            let verdict = self.assessor.assess(&page.id, &text).await;
            self.pages
                .set_quality(&page.id, verdict.score, verdict.status)
                .await?;
            let _ = event_tx
                .send(PipelineEvent::PageAssessed {
                    page_id: page.id.clone(),
                    score: verdict.score,
                    status: verdict.status,
                })
                .await;

            if verdict.status == QualityStatus::NeedsRescan {
                let rescan_outcome = self.rescan.run(&page.id).await?;
                let _ = event_tx
                    .send(PipelineEvent::PageRescanned {
                        page_id: page.id.clone(),
                        outcome: rescan_outcome,
                    })
                    .await;
                match rescan_outcome {
                    RescanOutcome::Exhausted => return Ok(PageOutcome::RescanExhausted),
                    RescanOutcome::Accepted { .. } => outcome = PageOutcome::Accepted,
                    RescanOutcome::Skipped => {}
                }
            } else if verdict.status == QualityStatus::Acceptable {
                outcome = PageOutcome::Accepted;
            }
        }

        if mode == PipelineMode::ScanOnly {
            return Ok(outcome);
        }
        let Some(correction) = &self.correction else {
            return Ok(outcome);
        };

        // Re-read: the scan half may have replaced text and status.
        let Some(page) = self.pages.get(&page.id).await? else {
            anyhow::bail!("page disappeared: {}", page.id);
        };
        if page.needs_manual_review {
            return Ok(outcome);
        }

        let score = page.quality_score.unwrap_or(100);
        match page.quality_status {
            QualityStatus::Acceptable => {
                if self.corrections.exists_for_page(&page.id).await? {
                    return Ok(outcome);
                }
                self.pages
                    .set_quality(&page.id, score, QualityStatus::NeedsCorrection)
                    .await?;
            }
            QualityStatus::NeedsCorrection => {
                // A crash between record insert and the status flip leaves a
                // corrected page mid-state; settle it instead of re-billing.
                if self.corrections.exists_for_page(&page.id).await? {
                    self.pages
                        .set_quality(&page.id, score, QualityStatus::Acceptable)
                        .await?;
                    return Ok(outcome);
                }
            }
            _ => return Ok(outcome),
        }

        let text = self.read_text(&page)?;
        match correction.correct(&page, &text).await? {
            CorrectionOutcome::Recorded {
                quality_score,
                needs_review,
            } => {
                self.pages
                    .set_quality(&page.id, score, QualityStatus::Acceptable)
                    .await?;
                let _ = event_tx
                    .send(PipelineEvent::PageCorrected {
                        page_id: page.id.clone(),
                        quality_score,
                        needs_review,
                    })
                    .await;
                Ok(PageOutcome::Corrected)
            }
            CorrectionOutcome::Deferred(reason) if reason.is_permanent() => {
                // Nothing to correct; the page is settled as acceptable.
                self.pages
                    .set_quality(&page.id, score, QualityStatus::Acceptable)
                    .await?;
                debug!("Correction settled for {}: {}", page.id, reason);
                Ok(outcome)
            }
            CorrectionOutcome::Deferred(reason) => Ok(PageOutcome::Deferred(reason.to_string())),
            CorrectionOutcome::Stopped(reason) => Ok(PageOutcome::Stopped(reason)),
        }
    }

    /// Drain the reprocessing queue: a higher-effort pass for pages the
    /// standard rescan loop gave up on.
    pub async fn drain_queue(
        &self,
        limit: usize,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> anyhow::Result<DrainSummary> {
        let mut summary = DrainSummary::default();

        loop {
            if limit > 0 && summary.processed >= limit {
                break;
            }
            let Some(entry) = self.queue.claim_next().await? else {
                break;
            };
            summary.processed += 1;

            let _ = event_tx
                .send(PipelineEvent::QueueEntryStarted {
                    page_id: entry.page_id.clone(),
                    reason: entry.reason.clone(),
                })
                .await;

            match self.reprocess_page(&entry.page_id).await {
                Ok(true) => {
                    self.queue.complete(entry.id).await?;
                    summary.completed += 1;
                    let _ = event_tx
                        .send(PipelineEvent::QueueEntryCompleted {
                            page_id: entry.page_id.clone(),
                        })
                        .await;
                }
                Ok(false) => {
                    self.queue
                        .fail(entry.id, "text still low quality after full ladder")
                        .await?;
                    summary.failed += 1;
                    let _ = event_tx
                        .send(PipelineEvent::QueueEntryFailed {
                            page_id: entry.page_id.clone(),
                            error: "text still low quality after full ladder".to_string(),
                        })
                        .await;
                }
                Err(e) => {
                    self.queue.fail(entry.id, &e.to_string()).await?;
                    summary.failed += 1;
                    let _ = event_tx
                        .send(PipelineEvent::QueueEntryFailed {
                            page_id: entry.page_id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        Ok(summary)
    }

    /// Best-effort reprocessing: run every strategy, keep the best result.
    async fn reprocess_page(&self, page_id: &str) -> anyhow::Result<bool> {
        let Some(page) = self.pages.get(page_id).await? else {
            anyhow::bail!("page not found: {}", page_id);
        };

        if !self.pages.claim(&page.id, self.claim_ttl).await? {
            anyhow::bail!("page is claimed by another worker: {}", page.id);
        }

        let result = self.reprocess_claimed(&page).await;
        if let Err(e) = self.pages.release(&page.id).await {
            warn!("Failed to release claim on {}: {}", page.id, e);
        }
        result
    }

    async fn reprocess_claimed(&self, page: &Page) -> anyhow::Result<bool> {
        // Failed pages re-enter the lifecycle through the one sanctioned
        // door: the deliberate reset.
        if page.quality_status == QualityStatus::Failed {
            self.pages.reset_for_retry(&page.id).await?;
        }

        let image = self.store.resolve(&page.image_path);
        let mut best: Option<String> = None;

        for attempt in 0..3 {
            let Some(strategy) = RescanStrategy::for_attempt(attempt) else {
                break;
            };
            let engine = self.ocr.clone();
            let image = image.clone();
            let extracted =
                tokio::task::spawn_blocking(move || engine.extract(&image, strategy)).await?;

            if let Ok(text) = extracted {
                if !self.assessor.is_degenerate(&text)
                    && best
                        .as_ref()
                        .map(|b| text.trim().chars().count() > b.trim().chars().count())
                        .unwrap_or(true)
                {
                    best = Some(text);
                }
            }
        }

        let Some(text) = best else {
            return Ok(false);
        };

        let text_path = page
            .text_path
            .clone()
            .unwrap_or_else(|| TextStore::text_path_for_image(&page.image_path));
        self.store.write_atomic(&text_path, &text)?;
        let hash = TextStore::content_hash(&text);
        self.pages
            .record_rescan(&page.id, &text_path, &hash, 0)
            .await?;

        let verdict = self.assessor.assess(&page.id, &text).await;
        self.pages
            .set_quality(&page.id, verdict.score, verdict.status)
            .await?;

        Ok(verdict.status == QualityStatus::Acceptable)
    }
}
