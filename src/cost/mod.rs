//! Cost and rate governor.
//!
//! Cross-cutting spend policy enforced by every billed call: token
//! estimation, the rolling daily cost ceiling, and the 429 exit rules.
//! The remaining budget is always derived from the append-only ledger, so
//! restarts and overlapping runs agree on how much is left.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::models::LedgerEntry;
use crate::repository::{CostLedgerRepository, DieselError};

/// Why a run stopped before the work list was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The provider signaled the daily quota is spent. No retry, no backoff;
    /// the scheduler's next run resumes where this one stopped.
    DailyRateLimit,
    /// The rolling daily cost ceiling was reached.
    BudgetExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyRateLimit => write!(f, "daily rate limit reached"),
            Self::BudgetExhausted => write!(f, "daily cost budget exhausted"),
        }
    }
}

/// What to do about a rate-limit error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    /// Stop the entire processing loop, not just this page.
    StopRun,
    /// Defer this page and continue with the rest of the batch.
    DeferPage,
}

/// Price per million tokens for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

fn default_pricing() -> ModelPricing {
    ModelPricing {
        input_per_mtok: 0.70,
        output_per_mtok: 2.80,
    }
}

fn default_max_daily_cost() -> f64 {
    10.0
}
fn default_token_buffer() -> f64 {
    0.03
}
fn default_chars_per_token() -> usize {
    4
}

/// Spend policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Rolling 24-hour spend ceiling in USD.
    #[serde(default = "default_max_daily_cost")]
    pub max_daily_cost_usd: f64,
    /// Safety margin added to token estimates.
    #[serde(default = "default_token_buffer")]
    pub token_buffer: f64,
    /// Characters per token for the estimation heuristic.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
    /// Per-model pricing; models not listed use `fallback_pricing`.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    #[serde(default = "default_pricing")]
    pub fallback_pricing: ModelPricing,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_daily_cost_usd: default_max_daily_cost(),
            token_buffer: default_token_buffer(),
            chars_per_token: default_chars_per_token(),
            pricing: HashMap::new(),
            fallback_pricing: default_pricing(),
        }
    }
}

/// Governor shared by every component that bills the API.
#[derive(Clone)]
pub struct CostGovernor {
    config: CostConfig,
    ledger: CostLedgerRepository,
}

impl CostGovernor {
    pub fn new(config: CostConfig, ledger: CostLedgerRepository) -> Self {
        Self { config, ledger }
    }

    fn pricing_for(&self, model: &str) -> ModelPricing {
        self.config
            .pricing
            .get(model)
            .copied()
            .unwrap_or(self.config.fallback_pricing)
    }

    fn chars_to_tokens(&self, chars: usize) -> i64 {
        (chars / self.config.chars_per_token.max(1)) as i64 + 1
    }

    /// Estimate total tokens for a call: prompt tokens plus twice the text
    /// tokens (the text goes in and a similar amount comes back), padded
    /// with the configured safety buffer.
    pub fn estimate_tokens(&self, prompt: &str, text: &str) -> i64 {
        let prompt_tokens = self.chars_to_tokens(prompt.chars().count());
        let text_tokens = self.chars_to_tokens(text.chars().count());
        let total = prompt_tokens + text_tokens * 2;
        total + (total as f64 * self.config.token_buffer).ceil() as i64
    }

    /// Price a token count against a model, splitting input/output.
    pub fn estimate_cost(&self, model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
        let pricing = self.pricing_for(model);
        (input_tokens as f64 * pricing.input_per_mtok
            + output_tokens as f64 * pricing.output_per_mtok)
            / 1_000_000.0
    }

    /// Remaining budget in the rolling 24-hour window.
    pub async fn remaining_budget(&self) -> Result<f64, DieselError> {
        let spent = self.ledger.total_last_day().await?;
        Ok((self.config.max_daily_cost_usd - spent).max(0.0))
    }

    /// Whether the ceiling itself has been reached (no billed call of any
    /// size may proceed).
    pub async fn budget_exhausted(&self) -> Result<bool, DieselError> {
        Ok(self.remaining_budget().await? <= 0.0)
    }

    /// Whether spending `estimated_cost` would cross the ceiling.
    pub async fn would_exceed_budget(&self, estimated_cost: f64) -> Result<bool, DieselError> {
        Ok(estimated_cost > self.remaining_budget().await?)
    }

    /// Record an actually-billed call in the ledger.
    pub async fn record_spend(&self, entry: &LedgerEntry) -> Result<(), DieselError> {
        self.ledger.append(entry).await
    }

    /// Map a chat error to the rate-limit policy, if it is one.
    pub fn handle_rate_limit(&self, err: &LlmError) -> Option<RateLimitAction> {
        match err {
            LlmError::RateLimited { daily: true } => Some(RateLimitAction::StopRun),
            LlmError::RateLimited { daily: false } => Some(RateLimitAction::DeferPage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> CostGovernor {
        let pool = crate::repository::AsyncSqlitePool::new(":memory:");
        CostGovernor::new(
            CostConfig::default(),
            CostLedgerRepository::new(pool),
        )
    }

    #[test]
    fn test_estimate_tokens_includes_buffer() {
        let gov = governor();
        // 400-char prompt -> ~101 tokens, 800-char text -> ~201 tokens
        let prompt = "p".repeat(400);
        let text = "t".repeat(800);
        let est = gov.estimate_tokens(&prompt, &text);
        let unbuffered = 101 + 201 * 2;
        assert!(est > unbuffered);
        assert!(est <= unbuffered + (unbuffered as f64 * 0.04) as i64 + 1);
    }

    #[test]
    fn test_estimate_cost_uses_fallback_pricing() {
        let gov = governor();
        let cost = gov.estimate_cost("unknown-model", 1_000_000, 0);
        assert!((cost - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_mapping() {
        let gov = governor();
        assert_eq!(
            gov.handle_rate_limit(&LlmError::RateLimited { daily: true }),
            Some(RateLimitAction::StopRun)
        );
        assert_eq!(
            gov.handle_rate_limit(&LlmError::RateLimited { daily: false }),
            Some(RateLimitAction::DeferPage)
        );
        assert_eq!(
            gov.handle_rate_limit(&LlmError::Api("boom".into())),
            None
        );
    }
}
