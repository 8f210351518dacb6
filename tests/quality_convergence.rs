//! End-to-end tests for the quality-convergence pipeline.
//!
//! Exercises the real SQLite store (via the migration registry) with
//! scripted OCR and chat backends, covering the lifecycle invariants:
//! bounded rescans, terminal failure, idempotent reruns, all-or-nothing
//! corrections, rate-limit cancellation, and claim exclusivity.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use pagelift::correction::{CorrectionConfig, CorrectionEngine};
use pagelift::cost::{CostConfig, CostGovernor, StopReason};
use pagelift::llm::{ChatClient, ChatMessage, ChatResponse, LlmError};
use pagelift::models::{Page, QualityStatus, QueueStatus};
use pagelift::ocr::{OcrEngine, OcrError, RescanStrategy};
use pagelift::pipeline::{PipelineEvent, PipelineMode, PipelineService};
use pagelift::quality::{QualityAssessor, QualityConfig};
use pagelift::repository::{
    run_migrations, AsyncSqlitePool, CorrectionRepository, CostLedgerRepository, PageRepository,
    ReprocessQueueRepository,
};
use pagelift::rescan::RescanEngine;
use pagelift::storage::TextStore;

const GOOD_TEXT: &str = "Exhibit 14 - Deposition of the custodian of records, continued on the following page.";

/// OCR backend that replays a scripted list of results.
struct ScriptedOcr {
    results: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<usize>,
}

impl ScriptedOcr {
    fn new(results: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl OcrEngine for ScriptedOcr {
    fn extract(&self, _image_path: &Path, _strategy: RescanStrategy) -> Result<String, OcrError> {
        *self.calls.lock().unwrap() += 1;
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(OcrError::ExtractionFailed(msg)),
            None => Ok(String::new()),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Chat backend that replays a scripted list of responses.
struct ScriptedChat {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<usize>,
}

impl ScriptedChat {
    fn new(responses: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<ChatResponse, LlmError> {
        *self.calls.lock().unwrap() += 1;
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(ChatResponse {
                text,
                model: "test-model".to_string(),
                input_tokens: 100,
                output_tokens: 100,
            }),
            Some(Err(err)) => Err(err),
            None => Err(LlmError::Api("script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        "test-model"
    }
}

/// Everything a test needs, over a throwaway database and data dir.
struct Fixture {
    _dir: tempfile::TempDir,
    store: TextStore,
    pages: PageRepository,
    corrections: CorrectionRepository,
    queue: ReprocessQueueRepository,
    ledger: CostLedgerRepository,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        run_migrations(&db_path.display().to_string())
            .await
            .unwrap();

        let pool = AsyncSqlitePool::from_path(&db_path);
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();

        Self {
            store: TextStore::new(&data_dir),
            pages: PageRepository::new(pool.clone()),
            corrections: CorrectionRepository::new(pool.clone()),
            queue: ReprocessQueueRepository::new(pool.clone()),
            ledger: CostLedgerRepository::new(pool),
            _dir: dir,
        }
    }

    /// Insert a page whose canonical text is already on disk.
    async fn add_page(&self, id: &str, text: &str) -> Page {
        let image_path = format!("{}.tif", id);
        let text_path = TextStore::text_path_for_image(&image_path);
        self.store.write_atomic(&text_path, text).unwrap();

        let mut page = Page::new(id.to_string(), image_path);
        page.text_path = Some(text_path);
        self.pages.insert(&page).await.unwrap();
        page
    }

    fn governor(&self, max_daily: f64) -> Arc<CostGovernor> {
        let config = CostConfig {
            max_daily_cost_usd: max_daily,
            ..CostConfig::default()
        };
        Arc::new(CostGovernor::new(config, self.ledger.clone()))
    }

    fn assessor(&self) -> Arc<QualityAssessor> {
        Arc::new(QualityAssessor::new(QualityConfig::default()))
    }

    fn rescan(&self, ocr: Arc<dyn OcrEngine>, max_attempts: i32) -> Arc<RescanEngine> {
        Arc::new(RescanEngine::new(
            self.pages.clone(),
            self.queue.clone(),
            self.store.clone(),
            ocr,
            self.assessor(),
            max_attempts,
        ))
    }

    fn correction_engine(
        &self,
        chat: Arc<dyn ChatClient>,
        governor: Arc<CostGovernor>,
    ) -> Arc<CorrectionEngine> {
        Arc::new(CorrectionEngine::new(
            chat,
            governor,
            self.corrections.clone(),
            self.pages.clone(),
            CorrectionConfig::default(),
            0.1,
        ))
    }

    fn service(
        &self,
        ocr: Arc<dyn OcrEngine>,
        correction: Option<Arc<CorrectionEngine>>,
    ) -> PipelineService {
        PipelineService::new(
            self.pages.clone(),
            self.corrections.clone(),
            self.queue.clone(),
            self.store.clone(),
            self.assessor(),
            self.rescan(ocr.clone(), 3),
            correction,
            ocr,
            1,
            chrono::Duration::minutes(90),
        )
    }

    async fn run(
        &self,
        service: &PipelineService,
        mode: PipelineMode,
    ) -> pagelift::pipeline::RunSummary {
        let (tx, mut rx) = mpsc::channel::<PipelineEvent>(256);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let summary = service.run(mode, 0, tx).await.unwrap();
        let _ = drain.await;
        summary
    }
}

const VALID_ASSESSMENT: &str = r#"{
    "quality_score": 88,
    "improvement_level": "moderate",
    "major_corrections": ["fixed character substitutions"],
    "confidence": "high",
    "needs_review": false
}"#;

#[tokio::test]
async fn degenerate_page_recovers_on_first_rescan() {
    let fx = Fixture::new().await;
    fx.add_page("page-a", "0 0 00 0").await;

    let ocr = ScriptedOcr::new(vec![Ok(GOOD_TEXT.to_string())]);
    let service = fx.service(ocr.clone(), None);
    let summary = fx.run(&service, PipelineMode::ScanOnly).await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rescan_failed, 0);

    let page = fx.pages.get("page-a").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Acceptable);
    assert_eq!(page.quality_score, Some(100));
    assert_eq!(page.rescan_attempts, 1);
    assert!(!page.needs_manual_review);

    // Canonical text was replaced with the rescued extraction.
    let text = fx
        .store
        .read(page.text_path.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(text, GOOD_TEXT);
    assert_eq!(page.text_hash.as_deref(), Some(&*TextStore::content_hash(GOOD_TEXT)));
}

#[tokio::test]
async fn rejected_rescans_exhaust_attempts_and_fail_terminally() {
    let fx = Fixture::new().await;
    fx.add_page("page-b", "xx\n").await;

    // Every attempt yields even shorter garbage; all are rejected.
    let ocr = ScriptedOcr::new(vec![
        Ok("x".to_string()),
        Ok("".to_string()),
        Err("engine crashed".to_string()),
    ]);
    let service = fx.service(ocr.clone(), None);
    let summary = fx.run(&service, PipelineMode::ScanOnly).await;

    assert_eq!(summary.rescan_failed, 1);

    let page = fx.pages.get("page-b").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Failed);
    assert_eq!(page.rescan_attempts, 3);
    assert!(page.needs_manual_review);

    // Rejected attempts never touch the canonical text.
    let text = fx
        .store
        .read(page.text_path.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(text, "xx\n");

    // Exhaustion lands the page in the reprocessing queue exactly once.
    assert_eq!(
        fx.queue.count_with_status(QueueStatus::Queued).await.unwrap(),
        1
    );

    // Second run: terminal pages are untouched. No extra attempts, no OCR
    // calls, no spend.
    let calls_before = ocr.call_count();
    let summary = fx.run(&service, PipelineMode::ScanOnly).await;
    assert_eq!(summary.processed, 0);
    assert_eq!(ocr.call_count(), calls_before);

    let page = fx.pages.get("page-b").await.unwrap().unwrap();
    assert_eq!(page.rescan_attempts, 3);
    assert_eq!(fx.ledger.count().await.unwrap(), 0);
}

#[tokio::test]
async fn rerun_on_settled_pages_is_free() {
    let fx = Fixture::new().await;
    fx.add_page("page-c", GOOD_TEXT).await;

    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr.clone(), None);

    let first = fx.run(&service, PipelineMode::Full).await;
    assert_eq!(first.accepted, 1);

    let second = fx.run(&service, PipelineMode::Full).await;
    assert_eq!(second.processed, 0);

    let page = fx.pages.get("page-c").await.unwrap().unwrap();
    assert_eq!(page.rescan_attempts, 0);
    assert_eq!(ocr.call_count(), 0);
    assert_eq!(fx.ledger.count().await.unwrap(), 0);
}

#[tokio::test]
async fn correction_records_only_when_both_rounds_succeed() {
    let fx = Fixture::new().await;
    fx.add_page("page-d", GOOD_TEXT).await;

    let corrected_text = format!("{} [UNCERTAIN: page number]", GOOD_TEXT);
    let chat = ScriptedChat::new(vec![
        Ok(corrected_text.clone()),
        Ok(VALID_ASSESSMENT.to_string()),
    ]);
    let governor = fx.governor(10.0);
    let engine = fx.correction_engine(chat.clone(), governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    let summary = fx.run(&service, PipelineMode::Full).await;
    assert_eq!(summary.corrected, 1);
    assert_eq!(chat.call_count(), 2);

    let record = fx
        .corrections
        .latest_for_page("page-d")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.original_text, GOOD_TEXT);
    assert_eq!(record.corrected_text, corrected_text);
    assert_eq!(record.quality_score, 88);
    assert!(!record.needs_review);

    // Both rounds were billed.
    assert_eq!(fx.ledger.count().await.unwrap(), 2);

    let page = fx.pages.get("page-d").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Acceptable);
    assert!(!page.needs_manual_review);
}

#[tokio::test]
async fn unparsable_assessment_discards_the_correction() {
    let fx = Fixture::new().await;
    fx.add_page("page-e", GOOD_TEXT).await;

    let chat = ScriptedChat::new(vec![
        Ok(format!("{} corrected", GOOD_TEXT)),
        Ok("I am unable to produce an assessment right now.".to_string()),
    ]);
    let governor = fx.governor(10.0);
    let engine = fx.correction_engine(chat.clone(), governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    let summary = fx.run(&service, PipelineMode::Full).await;
    assert_eq!(summary.corrected, 0);
    assert_eq!(summary.deferred, 1);

    // No record, and the page stays eligible for a later attempt.
    assert!(fx
        .corrections
        .latest_for_page("page-e")
        .await
        .unwrap()
        .is_none());
    let page = fx.pages.get("page-e").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::NeedsCorrection);
}

#[tokio::test]
async fn low_confidence_correction_is_stored_but_flagged() {
    let fx = Fixture::new().await;
    fx.add_page("page-f", GOOD_TEXT).await;

    let low_confidence = r#"{
        "quality_score": 40,
        "improvement_level": "minimal",
        "major_corrections": [],
        "confidence": "low",
        "needs_review": false
    }"#;
    let chat = ScriptedChat::new(vec![
        Ok(format!("{} corrected", GOOD_TEXT)),
        Ok(low_confidence.to_string()),
    ]);
    let governor = fx.governor(10.0);
    let engine = fx.correction_engine(chat, governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    fx.run(&service, PipelineMode::Full).await;

    let record = fx
        .corrections
        .latest_for_page("page-f")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quality_score, 40);

    // Stored, never auto-approved: the page carries the review marker.
    let page = fx.pages.get("page-f").await.unwrap().unwrap();
    assert!(page.needs_manual_review);
}

#[tokio::test]
async fn daily_rate_limit_stops_run_and_leaves_rest_untouched() {
    let fx = Fixture::new().await;
    for id in ["page-g1", "page-g2", "page-g3"] {
        fx.add_page(id, GOOD_TEXT).await;
        fx.pages
            .set_quality(id, 100, QualityStatus::Acceptable)
            .await
            .unwrap();
    }

    // First page's round 1 hits the daily quota.
    let chat = ScriptedChat::new(vec![Err(LlmError::RateLimited { daily: true })]);
    let governor = fx.governor(10.0);
    let engine = fx.correction_engine(chat.clone(), governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    let summary = fx.run(&service, PipelineMode::CorrectOnly).await;

    assert_eq!(summary.stopped, Some(StopReason::DailyRateLimit));
    assert_eq!(chat.call_count(), 1);
    assert_eq!(fx.ledger.count().await.unwrap(), 0);

    // Pages after the stop were never claimed or modified.
    for id in ["page-g2", "page-g3"] {
        let page = fx.pages.get(id).await.unwrap().unwrap();
        assert_eq!(page.quality_status, QualityStatus::Acceptable);
        assert!(page.claimed_at.is_none());
        assert!(fx.corrections.latest_for_page(id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn transient_rate_limit_defers_one_page_and_continues() {
    let fx = Fixture::new().await;
    fx.add_page("page-h1", GOOD_TEXT).await;
    fx.add_page("page-h2", GOOD_TEXT).await;

    let chat = ScriptedChat::new(vec![
        // page-h1 round 1: burst limit
        Err(LlmError::RateLimited { daily: false }),
        // page-h2 both rounds succeed
        Ok(format!("{} corrected", GOOD_TEXT)),
        Ok(VALID_ASSESSMENT.to_string()),
    ]);
    let governor = fx.governor(10.0);
    let engine = fx.correction_engine(chat.clone(), governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    let summary = fx.run(&service, PipelineMode::Full).await;

    assert_eq!(summary.stopped, None);
    assert_eq!(summary.deferred, 1);
    assert_eq!(summary.corrected, 1);
    assert!(fx
        .corrections
        .latest_for_page("page-h2")
        .await
        .unwrap()
        .is_some());
    assert!(fx
        .corrections
        .latest_for_page("page-h1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn zero_budget_stops_before_any_billed_call() {
    let fx = Fixture::new().await;
    fx.add_page("page-i", GOOD_TEXT).await;

    let chat = ScriptedChat::new(vec![Ok("should never be called".to_string())]);
    let governor = fx.governor(0.0);
    let engine = fx.correction_engine(chat.clone(), governor);
    let ocr = ScriptedOcr::new(vec![]);
    let service = fx.service(ocr, Some(engine));

    let summary = fx.run(&service, PipelineMode::Full).await;

    assert_eq!(summary.stopped, Some(StopReason::BudgetExhausted));
    assert_eq!(chat.call_count(), 0);
    assert_eq!(fx.ledger.count().await.unwrap(), 0);
}

#[tokio::test]
async fn claims_are_exclusive_until_released() {
    let fx = Fixture::new().await;
    fx.add_page("page-j", GOOD_TEXT).await;

    let ttl = chrono::Duration::minutes(90);
    assert!(fx.pages.claim("page-j", ttl).await.unwrap());
    // A second claimant loses while the claim is fresh.
    assert!(!fx.pages.claim("page-j", ttl).await.unwrap());

    fx.pages.release("page-j").await.unwrap();
    assert!(fx.pages.claim("page-j", ttl).await.unwrap());

    // A stale claim is reclaimable: TTL of zero expires it immediately.
    assert!(fx
        .pages
        .claim("page-j", chrono::Duration::zero())
        .await
        .unwrap());
}

#[tokio::test]
async fn enqueue_is_idempotent_per_page() {
    let fx = Fixture::new().await;
    fx.add_page("page-k", "xx").await;

    assert!(fx.queue.enqueue("page-k", "unusable text", 5).await.unwrap());
    // Active entry exists: second enqueue is a no-op.
    assert!(!fx.queue.enqueue("page-k", "unusable text", 5).await.unwrap());
    assert_eq!(
        fx.queue.count_with_status(QueueStatus::Queued).await.unwrap(),
        1
    );

    // Claiming moves it to processing; still counts as active.
    let entry = fx.queue.claim_next().await.unwrap().unwrap();
    assert!(!fx.queue.enqueue("page-k", "again", 5).await.unwrap());

    // Once completed, a fresh entry is allowed.
    fx.queue.complete(entry.id).await.unwrap();
    assert!(fx.queue.enqueue("page-k", "second pass", 1).await.unwrap());
}

#[tokio::test]
async fn queue_drain_rescues_failed_pages() {
    let fx = Fixture::new().await;
    fx.add_page("page-q", "xx\n").await;

    // Standard rescan loop exhausts its attempts and fails the page.
    let bad_ocr = ScriptedOcr::new(vec![Ok("x".into()), Ok("x".into()), Ok("x".into())]);
    let service = fx.service(bad_ocr, None);
    fx.run(&service, PipelineMode::ScanOnly).await;
    assert_eq!(
        fx.queue.count_with_status(QueueStatus::Queued).await.unwrap(),
        1
    );

    // The drain pass runs the whole ladder and keeps the best result.
    let good_ocr = ScriptedOcr::new(vec![
        Ok(GOOD_TEXT.to_string()),
        Ok("short".to_string()),
        Err("legacy engine unavailable".to_string()),
    ]);
    let service = fx.service(good_ocr, None);
    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(64);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let summary = service.drain_queue(0, tx).await.unwrap();
    let _ = drain.await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(
        fx.queue
            .count_with_status(QueueStatus::Completed)
            .await
            .unwrap(),
        1
    );

    let page = fx.pages.get("page-q").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Acceptable);
    assert_eq!(page.rescan_attempts, 0);
    let text = fx
        .store
        .read(page.text_path.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(text, GOOD_TEXT);
}

#[tokio::test]
async fn failed_queue_entry_can_be_retried_manually() {
    let fx = Fixture::new().await;
    fx.add_page("page-l", "xx").await;

    fx.queue.enqueue("page-l", "unusable", 0).await.unwrap();
    let entry = fx.queue.claim_next().await.unwrap().unwrap();
    fx.queue.fail(entry.id, "extraction crashed").await.unwrap();

    let failed = fx
        .queue
        .list(Some(QueueStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message.as_deref(), Some("extraction crashed"));

    assert!(fx.queue.retry(entry.id).await.unwrap());
    assert_eq!(
        fx.queue.count_with_status(QueueStatus::Queued).await.unwrap(),
        1
    );
    // Retrying a queued entry is a no-op.
    assert!(!fx.queue.retry(entry.id).await.unwrap());
}

#[tokio::test]
async fn reset_for_retry_is_the_only_door_out_of_failed() {
    let fx = Fixture::new().await;
    fx.add_page("page-m", "xx\n").await;

    let ocr = ScriptedOcr::new(vec![Ok("x".into()), Ok("x".into()), Ok("x".into())]);
    let service = fx.service(ocr, None);
    fx.run(&service, PipelineMode::ScanOnly).await;

    let page = fx.pages.get("page-m").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Failed);

    assert!(fx.pages.reset_for_retry("page-m").await.unwrap());
    let page = fx.pages.get("page-m").await.unwrap().unwrap();
    assert_eq!(page.quality_status, QualityStatus::Unchecked);
    assert_eq!(page.rescan_attempts, 0);
    assert_eq!(page.quality_score, None);
    assert!(!page.needs_manual_review);

    // Resetting a non-failed page does nothing.
    assert!(!fx.pages.reset_for_retry("page-m").await.unwrap());
}

#[tokio::test]
async fn review_marker_resolution() {
    let fx = Fixture::new().await;
    fx.add_page("page-n", GOOD_TEXT).await;

    fx.pages.set_needs_review("page-n", true).await.unwrap();
    assert_eq!(fx.pages.count_needing_review().await.unwrap(), 1);

    assert!(fx.pages.mark_reviewed("page-n").await.unwrap());
    assert_eq!(fx.pages.count_needing_review().await.unwrap(), 0);
    assert!(!fx.pages.mark_reviewed("page-n").await.unwrap());
}

#[tokio::test]
async fn spend_totals_come_from_the_ledger() {
    use pagelift::models::{BilledOperation, LedgerEntry};

    let fx = Fixture::new().await;
    let governor = fx.governor(1.0);

    governor
        .record_spend(&LedgerEntry::new(
            "test-model",
            BilledOperation::Correct,
            Some("p1".to_string()),
            1000,
            1000,
            0.75,
        ))
        .await
        .unwrap();

    // A fresh governor over the same ledger sees the same remaining budget:
    // the window is derived, not cached.
    let other = fx.governor(1.0);
    let remaining = other.remaining_budget().await.unwrap();
    assert!((remaining - 0.25).abs() < 1e-9);
    assert!(other.would_exceed_budget(0.30).await.unwrap());
    assert!(!other.would_exceed_budget(0.20).await.unwrap());
}
