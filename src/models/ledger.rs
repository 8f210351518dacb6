//! Cost ledger models.
//!
//! Every billed API call appends one entry. The ledger is never mutated;
//! rolling spend totals are recomputed by aggregation so a restarted process
//! recovers the correct remaining budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which billed operation produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BilledOperation {
    /// Remote quality classification of raw OCR text.
    Classify,
    /// Round 1: text correction.
    Correct,
    /// Round 2: correction quality assessment.
    Assess,
}

impl BilledOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Correct => "correct",
            Self::Assess => "assess",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "classify" => Some(Self::Classify),
            "correct" => Some(Self::Correct),
            "assess" => Some(Self::Assess),
            _ => None,
        }
    }
}

/// One billed API call.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub model: String,
    pub operation: BilledOperation,
    pub page_id: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        model: impl Into<String>,
        operation: BilledOperation,
        page_id: Option<String>,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Self {
        Self {
            model: model.into(),
            operation,
            page_id,
            input_tokens,
            output_tokens,
            cost_usd,
            created_at: Utc::now(),
        }
    }
}
