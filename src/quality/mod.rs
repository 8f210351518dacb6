//! OCR quality assessment.
//!
//! A deterministic local pass classifies raw OCR text before any paid call:
//! degenerate output (zeros, gibberish, binary noise) is caught by cheap
//! heuristics. Only text that survives the local pass is optionally sent to
//! a remote classifier, and any remote error counts as a failure verdict:
//! bad text gets rescanned rather than silently accepted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cost::CostGovernor;
use crate::llm::{ChatClient, ChatMessage};
use crate::models::{BilledOperation, LedgerEntry, QualityStatus};

/// Why the assessor scored a text the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    EmptyText,
    TooShort,
    OnlyZeros,
    DigitsAndPunctuationOnly,
    MostlyNonAlphabetic,
    ExcessiveRepetition,
    GibberishWords,
    FailurePattern,
    ExcessiveSpecialChars,
    RemoteClassifiedFailure,
    RemoteCallFailed,
    PassedChecks,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyText => "empty_text",
            Self::TooShort => "too_short",
            Self::OnlyZeros => "only_zeros",
            Self::DigitsAndPunctuationOnly => "digits_and_punctuation_only",
            Self::MostlyNonAlphabetic => "mostly_non_alphabetic",
            Self::ExcessiveRepetition => "excessive_repetition",
            Self::GibberishWords => "gibberish_words",
            Self::FailurePattern => "failure_pattern",
            Self::ExcessiveSpecialChars => "excessive_special_chars",
            Self::RemoteClassifiedFailure => "remote_classified_failure",
            Self::RemoteCallFailed => "remote_call_failed",
            Self::PassedChecks => "passed_checks",
        }
    }
}

/// Assessment result: score, mapped status, and the reasons behind them.
#[derive(Debug, Clone)]
pub struct Verdict {
    /// 0 (catastrophic) or 100 (acceptable).
    pub score: i32,
    pub status: QualityStatus,
    pub reasons: Vec<ReasonCode>,
}

impl Verdict {
    fn failure(reason: ReasonCode) -> Self {
        Self {
            score: 0,
            status: QualityStatus::NeedsRescan,
            reasons: vec![reason],
        }
    }

    fn acceptable() -> Self {
        Self {
            score: 100,
            status: QualityStatus::Acceptable,
            reasons: vec![ReasonCode::PassedChecks],
        }
    }
}

/// Substrings that indicate a hard OCR failure regardless of other signals:
/// stuck keys, keyboard walks, and digit runs.
const FAILURE_PATTERNS: &[&str] = &[
    "qqqq", "wwww", "eeee", "rrrr", "tttt", "yyyy", "asdf", "qwer", "zxcv", "0000", "1111", "2222",
    "3333",
];

fn default_min_text_len() -> usize {
    10
}
fn default_short_zero_ratio() -> f64 {
    0.5
}
fn default_zero_word_ratio() -> f64 {
    0.7
}
fn default_min_alpha_ratio() -> f64 {
    0.3
}
fn default_max_char_repetition() -> f64 {
    0.4
}
fn default_min_avg_word_len() -> f64 {
    2.0
}
fn default_max_special_ratio() -> f64 {
    0.5
}
fn default_max_classifier_chars() -> usize {
    4000
}

/// Detection thresholds. All tunable; the defaults come from field
/// observations on scanned legal archives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum characters for text to be assessable at all.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    /// Zero-character ratio above which short text is considered degenerate.
    #[serde(default = "default_short_zero_ratio")]
    pub short_zero_ratio: f64,
    /// Fraction of all-zero words above which text is considered degenerate.
    #[serde(default = "default_zero_word_ratio")]
    pub zero_word_ratio: f64,
    /// Minimum fraction of alphabetic characters.
    #[serde(default = "default_min_alpha_ratio")]
    pub min_alpha_ratio: f64,
    /// Maximum fraction of the text one repeated character may occupy.
    #[serde(default = "default_max_char_repetition")]
    pub max_char_repetition: f64,
    /// Minimum average word length.
    #[serde(default = "default_min_avg_word_len")]
    pub min_avg_word_len: f64,
    /// Maximum fraction of special (non-alphanumeric, non-space) characters.
    #[serde(default = "default_max_special_ratio")]
    pub max_special_ratio: f64,
    /// Whether to confirm locally-passing text with a remote classifier.
    #[serde(default)]
    pub remote_classifier: bool,
    /// Maximum characters of text sent to the remote classifier.
    #[serde(default = "default_max_classifier_chars")]
    pub max_classifier_chars: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_text_len: default_min_text_len(),
            short_zero_ratio: default_short_zero_ratio(),
            zero_word_ratio: default_zero_word_ratio(),
            min_alpha_ratio: default_min_alpha_ratio(),
            max_char_repetition: default_max_char_repetition(),
            min_avg_word_len: default_min_avg_word_len(),
            max_special_ratio: default_max_special_ratio(),
            remote_classifier: false,
            max_classifier_chars: default_max_classifier_chars(),
        }
    }
}

const CLASSIFY_PROMPT: &str = "You are reviewing raw OCR output from a scanned document. Decide whether the extraction is a catastrophic failure (unreadable, truncated, or garbage) or acceptable readable text.\n\nOCR TEXT:\n{text}\n\nRespond with exactly one word: ACCEPTABLE or FAILURE.";

/// Quality assessor: local heuristics plus an optional remote classifier.
pub struct QualityAssessor {
    config: QualityConfig,
    classifier: Option<(Arc<dyn ChatClient>, Arc<CostGovernor>)>,
}

impl QualityAssessor {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    /// Attach a remote classifier, gated by the cost governor.
    pub fn with_classifier(mut self, chat: Arc<dyn ChatClient>, governor: Arc<CostGovernor>) -> Self {
        self.classifier = Some((chat, governor));
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Deterministic local pass. No I/O, no spend.
    pub fn local_verdict(&self, text: &str) -> Verdict {
        let text = text.trim();
        if text.is_empty() {
            return Verdict::failure(ReasonCode::EmptyText);
        }

        let chars: Vec<char> = text.chars().collect();
        let char_count = chars.len();
        let non_space: Vec<char> = chars.iter().copied().filter(|c| !c.is_whitespace()).collect();

        // Repeated zeros with spaces ("0 0 00 0") and all-zero content.
        if !non_space.is_empty() && non_space.iter().all(|c| *c == '0') {
            return Verdict::failure(ReasonCode::OnlyZeros);
        }

        // Short text dominated by zeros.
        let zero_count = chars.iter().filter(|c| **c == '0').count();
        if char_count < 20 && zero_count as f64 > char_count as f64 * self.config.short_zero_ratio {
            return Verdict::failure(ReasonCode::OnlyZeros);
        }

        if char_count < self.config.min_text_len {
            return Verdict::failure(ReasonCode::TooShort);
        }

        // Mostly all-zero words ("0 0 00 000 0 x").
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > 3 {
            let zero_words = words
                .iter()
                .filter(|w| !w.is_empty() && w.chars().all(|c| c == '0'))
                .count();
            if zero_words as f64 / words.len() as f64 > self.config.zero_word_ratio {
                return Verdict::failure(ReasonCode::OnlyZeros);
            }
        }

        // Nothing but digits, whitespace, and punctuation.
        if chars
            .iter()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || c.is_ascii_punctuation())
        {
            return Verdict::failure(ReasonCode::DigitsAndPunctuationOnly);
        }

        // Failed image/handwriting extractions come out as symbol soup.
        let alpha_count = chars.iter().filter(|c| c.is_alphabetic()).count();
        if !non_space.is_empty()
            && (alpha_count as f64 / non_space.len() as f64) < self.config.min_alpha_ratio
        {
            return Verdict::failure(ReasonCode::MostlyNonAlphabetic);
        }

        // One character repeated through much of the text.
        let mut counts = std::collections::HashMap::new();
        for c in chars.iter().filter(|c| c.is_alphanumeric()) {
            *counts.entry(*c).or_insert(0usize) += 1;
        }
        if let Some(max_repeat) = counts.values().max() {
            if *max_repeat as f64 > char_count as f64 * self.config.max_char_repetition {
                return Verdict::failure(ReasonCode::ExcessiveRepetition);
            }
        }

        // Streams of one- and two-letter fragments.
        if !words.is_empty() {
            let avg_len =
                words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64;
            if avg_len < self.config.min_avg_word_len {
                return Verdict::failure(ReasonCode::GibberishWords);
            }
        }

        let lower = text.to_lowercase();
        if FAILURE_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Verdict::failure(ReasonCode::FailurePattern);
        }

        let special = chars
            .iter()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if special as f64 / char_count as f64 > self.config.max_special_ratio {
            return Verdict::failure(ReasonCode::ExcessiveSpecialChars);
        }

        Verdict::acceptable()
    }

    /// Convenience check used by rescan validation.
    pub fn is_degenerate(&self, text: &str) -> bool {
        self.local_verdict(text).score == 0
    }

    /// Full assessment: local pass, then the remote classifier when one is
    /// configured and the budget allows.
    ///
    /// Remote problems never surface to the caller: a failed or ambiguous
    /// classification becomes a failure verdict, and a skipped call (budget)
    /// leaves the local verdict standing.
    pub async fn assess(&self, page_id: &str, text: &str) -> Verdict {
        let local = self.local_verdict(text);
        if local.score == 0 {
            return local;
        }

        let Some((chat, governor)) = &self.classifier else {
            return local;
        };
        if !self.config.remote_classifier {
            return local;
        }

        let truncated = truncate_chars(text, self.config.max_classifier_chars);
        let prompt = CLASSIFY_PROMPT.replace("{text}", truncated);

        // Local checks stay free; only the remote confirmation is billed.
        match governor.budget_exhausted().await {
            Ok(true) => {
                debug!("Skipping remote classification for {}: budget spent", page_id);
                return local;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Budget check failed for {}: {}", page_id, e);
                return local;
            }
        }
        let est_tokens = governor.estimate_tokens(&prompt, "");
        let est_cost = governor.estimate_cost(chat.model(), est_tokens, 16);
        match governor.would_exceed_budget(est_cost).await {
            Ok(true) => {
                debug!("Skipping remote classification for {}: over budget", page_id);
                return local;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Budget check failed for {}: {}", page_id, e);
                return local;
            }
        }

        let messages = [ChatMessage::user(prompt)];
        match chat.complete(&messages, 0.0).await {
            Ok(resp) => {
                let cost =
                    governor.estimate_cost(&resp.model, resp.input_tokens, resp.output_tokens);
                let entry = LedgerEntry::new(
                    resp.model.clone(),
                    BilledOperation::Classify,
                    Some(page_id.to_string()),
                    resp.input_tokens,
                    resp.output_tokens,
                    cost,
                );
                if let Err(e) = governor.record_spend(&entry).await {
                    warn!("Failed to record classification spend: {}", e);
                }

                match parse_classification(&resp.text) {
                    Some(true) => local,
                    // Ambiguous answers count as failure, never as success.
                    _ => Verdict::failure(ReasonCode::RemoteClassifiedFailure),
                }
            }
            Err(e) => {
                warn!("Remote classification failed for {}: {}", page_id, e);
                Verdict::failure(ReasonCode::RemoteCallFailed)
            }
        }
    }
}

/// Parse the one-word classification. Some(true) = acceptable,
/// Some(false) = failure, None = ambiguous.
fn parse_classification(response: &str) -> Option<bool> {
    let first = response.trim().split_whitespace().next()?;
    let word: String = first.chars().filter(|c| c.is_alphabetic()).collect();
    match word.to_uppercase().as_str() {
        "ACCEPTABLE" => Some(true),
        "FAILURE" => Some(false),
        _ => None,
    }
}

/// Truncate on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
