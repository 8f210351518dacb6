//! CLI commands implementation.

mod import;
mod init;
mod page;
mod pipeline_cmd;
mod queue;
mod status;

use std::sync::Arc;

pub use import::cmd_import;
pub use init::cmd_init;
pub use page::{cmd_reset, cmd_review, cmd_show};
pub use pipeline_cmd::cmd_pipeline;
pub use queue::{cmd_queue_add, cmd_queue_drain, cmd_queue_list, cmd_queue_retry};
pub use status::cmd_status;

use crate::config::Settings;
use crate::correction::CorrectionEngine;
use crate::cost::CostGovernor;
use crate::llm::{ChatClient, HttpChatClient};
use crate::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::PipelineService;
use crate::quality::QualityAssessor;
use crate::repository::{
    AsyncSqlitePool, CorrectionRepository, CostLedgerRepository, PageRepository,
    ReprocessQueueRepository,
};
use crate::rescan::RescanEngine;
use crate::storage::TextStore;

/// Everything a command needs, wired once.
pub(crate) struct ServiceGraph {
    pub pages: PageRepository,
    pub corrections: CorrectionRepository,
    pub queue: ReprocessQueueRepository,
    pub ledger: CostLedgerRepository,
    pub governor: Arc<CostGovernor>,
    pub service: PipelineService,
}

/// Build the repository and engine graph from settings.
///
/// Runs pending migrations first so every entry point can work against a
/// freshly-created or shared database.
pub(crate) async fn build_graph(settings: &Settings) -> anyhow::Result<ServiceGraph> {
    crate::repository::run_migrations(&settings.database_url()).await?;

    let pool = AsyncSqlitePool::from_path(&settings.database_path);
    let pages = PageRepository::new(pool.clone());
    let corrections = CorrectionRepository::new(pool.clone());
    let queue = ReprocessQueueRepository::new(pool.clone());
    let ledger = CostLedgerRepository::new(pool);

    let governor = Arc::new(CostGovernor::new(settings.cost.clone(), ledger.clone()));
    let store = TextStore::new(&settings.data_dir);
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(&settings.rescan.language));

    let chat: Option<Arc<dyn ChatClient>> = if settings.llm.enabled {
        Some(Arc::new(HttpChatClient::new(settings.llm.clone())))
    } else {
        None
    };

    let mut assessor = QualityAssessor::new(settings.quality.clone());
    if settings.quality.remote_classifier {
        if let Some(chat) = &chat {
            assessor = assessor.with_classifier(chat.clone(), governor.clone());
        }
    }
    let assessor = Arc::new(assessor);

    let rescan = Arc::new(RescanEngine::new(
        pages.clone(),
        queue.clone(),
        store.clone(),
        ocr.clone(),
        assessor.clone(),
        settings.rescan.max_attempts,
    ));

    let correction_engine = match (&chat, settings.correction.enabled) {
        (Some(chat), true) => Some(Arc::new(CorrectionEngine::new(
            chat.clone(),
            governor.clone(),
            corrections.clone(),
            pages.clone(),
            settings.correction.clone(),
            settings.llm.temperature,
        ))),
        _ => None,
    };

    let service = PipelineService::new(
        pages.clone(),
        corrections.clone(),
        queue.clone(),
        store,
        assessor,
        rescan,
        correction_engine,
        ocr,
        settings.workers,
        settings.claim_ttl(),
    );

    Ok(ServiceGraph {
        pages,
        corrections,
        queue,
        ledger,
        governor,
        service,
    })
}
