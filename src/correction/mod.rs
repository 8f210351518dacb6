//! Correction engine: two-round LLM workflow.
//!
//! Round 1 repairs OCR artifacts under strict no-semantic-change rules.
//! Round 2 has the model assess its own correction and return a structured
//! verdict. A correction record is persisted only when both rounds succeed;
//! every other path leaves the page exactly as it was and reports why.

pub mod parse;
pub mod prompts;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cost::{CostGovernor, RateLimitAction, StopReason};
use crate::llm::{ChatClient, ChatMessage, LlmError};
use crate::models::{BilledOperation, LedgerEntry, Page};
use crate::repository::{CorrectionRepository, PageRepository};

/// Why a page was left for a later run instead of corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// Text too short to be worth a billed correction.
    TextTooShort,
    /// The model returned the input unchanged; nothing to record.
    NoChanges,
    /// The estimated cost does not fit the remaining daily budget.
    BudgetExceeded,
    /// Transient (non-daily) rate limit.
    RateLimited,
    /// Round-2 response survived no recovery attempt.
    UnparsableAssessment,
    /// Any other API failure.
    ApiError(String),
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTooShort => write!(f, "text too short"),
            Self::NoChanges => write!(f, "no changes produced"),
            Self::BudgetExceeded => write!(f, "estimated cost over remaining budget"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::UnparsableAssessment => write!(f, "assessment response unparsable"),
            Self::ApiError(msg) => write!(f, "api error: {}", msg),
        }
    }
}

impl DeferReason {
    /// Permanent deferrals settle the page; transient ones leave it eligible
    /// for the next run.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::TextTooShort | Self::NoChanges)
    }
}

/// Result of one correction pass over a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// Both rounds succeeded; a record was stored.
    Recorded {
        quality_score: i32,
        needs_review: bool,
    },
    /// Page skipped; nothing persisted, nothing changed.
    Deferred(DeferReason),
    /// Fatal-to-the-run condition; the driver must stop taking new work.
    Stopped(StopReason),
}

/// One gated, billed chat call.
enum GatedCall {
    Response(crate::llm::ChatResponse, f64),
    Defer(DeferReason),
    Stop(StopReason),
}

fn default_document_type() -> String {
    "Legal Document".to_string()
}
fn default_min_text_len() -> usize {
    10
}
fn default_enabled() -> bool {
    true
}

/// Correction workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Document context passed to the correction prompt.
    #[serde(default = "default_document_type")]
    pub document_type: String,
    /// Minimum text length worth correcting.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            document_type: default_document_type(),
            min_text_len: default_min_text_len(),
        }
    }
}

pub struct CorrectionEngine {
    chat: Arc<dyn ChatClient>,
    governor: Arc<CostGovernor>,
    corrections: CorrectionRepository,
    pages: PageRepository,
    config: CorrectionConfig,
    temperature: f32,
}

impl CorrectionEngine {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        governor: Arc<CostGovernor>,
        corrections: CorrectionRepository,
        pages: PageRepository,
        config: CorrectionConfig,
        temperature: f32,
    ) -> Self {
        Self {
            chat,
            governor,
            corrections,
            pages,
            config,
            temperature,
        }
    }

    /// Budget-gate, issue, and account one billed call.
    async fn gated_call(
        &self,
        page_id: &str,
        operation: BilledOperation,
        prompt: String,
        text_for_estimate: &str,
    ) -> anyhow::Result<GatedCall> {
        // Ceiling reached: stop the run, not just this page.
        if self.governor.budget_exhausted().await? {
            return Ok(GatedCall::Stop(StopReason::BudgetExhausted));
        }

        let est_tokens = self.governor.estimate_tokens(&prompt, text_for_estimate);
        let text_tokens = self.governor.estimate_tokens("", text_for_estimate);
        let est_cost = self
            .governor
            .estimate_cost(self.chat.model(), est_tokens, text_tokens);
        if self.governor.would_exceed_budget(est_cost).await? {
            debug!(
                "Deferring {} for {}: estimated ${:.4} over remaining budget",
                operation.as_str(),
                page_id,
                est_cost
            );
            return Ok(GatedCall::Defer(DeferReason::BudgetExceeded));
        }

        let messages = [ChatMessage::user(prompt)];
        match self.chat.complete(&messages, self.temperature).await {
            Ok(resp) => {
                let cost = self
                    .governor
                    .estimate_cost(&resp.model, resp.input_tokens, resp.output_tokens);
                let entry = LedgerEntry::new(
                    resp.model.clone(),
                    operation,
                    Some(page_id.to_string()),
                    resp.input_tokens,
                    resp.output_tokens,
                    cost,
                );
                self.governor.record_spend(&entry).await?;
                Ok(GatedCall::Response(resp, cost))
            }
            Err(err) => match self.governor.handle_rate_limit(&err) {
                Some(RateLimitAction::StopRun) => {
                    warn!("Daily rate limit hit while processing {}", page_id);
                    Ok(GatedCall::Stop(StopReason::DailyRateLimit))
                }
                Some(RateLimitAction::DeferPage) => Ok(GatedCall::Defer(DeferReason::RateLimited)),
                None => match err {
                    LlmError::Disabled => Ok(GatedCall::Defer(DeferReason::ApiError(
                        "llm disabled".to_string(),
                    ))),
                    other => Ok(GatedCall::Defer(DeferReason::ApiError(other.to_string()))),
                },
            },
        }
    }

    /// Run the two-round workflow for one page.
    ///
    /// On every non-`Recorded` outcome the page state is untouched: no
    /// correction row, no review marker, no partial results.
    pub async fn correct(&self, page: &Page, original: &str) -> anyhow::Result<CorrectionOutcome> {
        if original.trim().chars().count() < self.config.min_text_len {
            return Ok(CorrectionOutcome::Deferred(DeferReason::TextTooShort));
        }

        let started = Instant::now();

        // Round 1: correction.
        let prompt = prompts::correction_prompt(original, &self.config.document_type);
        let (round1, cost1) = match self
            .gated_call(&page.id, BilledOperation::Correct, prompt, original)
            .await?
        {
            GatedCall::Response(resp, cost) => (resp, cost),
            GatedCall::Defer(reason) => return Ok(CorrectionOutcome::Deferred(reason)),
            GatedCall::Stop(reason) => return Ok(CorrectionOutcome::Stopped(reason)),
        };

        let corrected = round1.text.trim().to_string();
        if corrected.is_empty() || corrected == original.trim() {
            debug!("Correction for {} produced no changes", page.id);
            return Ok(CorrectionOutcome::Deferred(DeferReason::NoChanges));
        }

        // Round 2: assessment of the correction.
        let prompt = prompts::assessment_prompt(original, &corrected);
        let (round2, cost2) = match self
            .gated_call(&page.id, BilledOperation::Assess, prompt, &corrected)
            .await?
        {
            GatedCall::Response(resp, cost) => (resp, cost),
            GatedCall::Defer(reason) => return Ok(CorrectionOutcome::Deferred(reason)),
            GatedCall::Stop(reason) => return Ok(CorrectionOutcome::Stopped(reason)),
        };

        let Some((assessment, assessment_json)) = parse::parse_assessment(&round2.text) else {
            warn!(
                "Unparsable assessment for {}; discarding round-1 output",
                page.id
            );
            return Ok(CorrectionOutcome::Deferred(DeferReason::UnparsableAssessment));
        };

        // Both rounds succeeded: persist the record, then the review marker.
        let elapsed_ms = started.elapsed().as_millis() as i64;
        self.corrections
            .insert(
                &page.id,
                original,
                &corrected,
                &assessment,
                &assessment_json,
                &round1.model,
                cost1 + cost2,
                elapsed_ms,
            )
            .await?;

        let needs_review = assessment.requires_review();
        if needs_review {
            // Stored but never auto-approved; the original stays the
            // default for display until a human signs off.
            self.pages.set_needs_review(&page.id, true).await?;
        }

        info!(
            "Correction recorded for {} (score {}, confidence {}, ${:.4}, {} ms)",
            page.id,
            assessment.quality_score,
            assessment.confidence.as_str(),
            cost1 + cost2,
            elapsed_ms
        );

        Ok(CorrectionOutcome::Recorded {
            quality_score: assessment.quality_score,
            needs_review,
        })
    }
}
