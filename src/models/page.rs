//! Page models for OCR text-quality tracking.
//!
//! A page is one scanned image's text-quality lifecycle: raw OCR text,
//! quality verdicts, rescan attempt counters, and review markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality lifecycle state of a page's OCR text.
///
/// Transitions are driven by the quality assessor and the rescan engine:
///
/// ```text
/// unchecked -> {acceptable, needs_rescan, needs_correction}
/// needs_rescan -> {acceptable, needs_rescan, failed}
/// acceptable <-> needs_correction
/// failed -> unchecked (manual reset only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Unchecked,
    Acceptable,
    NeedsRescan,
    NeedsCorrection,
    Failed,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Acceptable => "acceptable",
            Self::NeedsRescan => "needs_rescan",
            Self::NeedsCorrection => "needs_correction",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unchecked" => Some(Self::Unchecked),
            "acceptable" => Some(Self::Acceptable),
            "needs_rescan" => Some(Self::NeedsRescan),
            "needs_correction" => Some(Self::NeedsCorrection),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether automatic processing is done with this page.
    ///
    /// `failed` pages are only revived by an explicit operator reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acceptable | Self::Failed)
    }

    /// Check whether an automatic transition to `next` is legal.
    ///
    /// The manual reset path (`failed -> unchecked`) is deliberately not
    /// covered here; `PageRepository::reset_for_retry` is the only caller
    /// allowed to make it.
    pub fn can_transition_to(&self, next: QualityStatus) -> bool {
        use QualityStatus::*;
        match (*self, next) {
            (Unchecked, Acceptable | NeedsRescan | NeedsCorrection) => true,
            (NeedsRescan, Acceptable | NeedsRescan | Failed) => true,
            (Acceptable, NeedsCorrection) => true,
            (NeedsCorrection, Acceptable) => true,
            _ => false,
        }
    }
}

/// A page row as seen by the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Stable identifier, foreign key to the image asset.
    pub id: String,
    /// Source image path, relative to the data directory.
    pub image_path: String,
    /// Canonical OCR text file path, relative to the data directory.
    /// Owned exclusively by the rescan engine; replaced atomically.
    pub text_path: Option<String>,
    /// SHA-256 of the canonical text, updated on every replace.
    pub text_hash: Option<String>,
    /// 0-100, written only by the quality assessor.
    pub quality_score: Option<i32>,
    pub quality_status: QualityStatus,
    /// Monotone counter, capped at the configured maximum.
    pub rescan_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub needs_manual_review: bool,
    /// Worker claim marker; stale claims expire after the configured TTL.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Create a fresh, unassessed page for an image asset.
    pub fn new(id: String, image_path: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            image_path,
            text_path: None,
            text_hash: None,
            quality_score: None,
            quality_status: QualityStatus::Unchecked,
            rescan_attempts: 0,
            last_attempt_at: None,
            needs_manual_review: false,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            QualityStatus::Unchecked,
            QualityStatus::Acceptable,
            QualityStatus::NeedsRescan,
            QualityStatus::NeedsCorrection,
            QualityStatus::Failed,
        ] {
            assert_eq!(QualityStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(QualityStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_failed_is_terminal() {
        assert!(QualityStatus::Failed.is_terminal());
        assert!(QualityStatus::Acceptable.is_terminal());
        assert!(!QualityStatus::NeedsRescan.is_terminal());

        // No automatic transition leaves the failed state.
        for next in [
            QualityStatus::Unchecked,
            QualityStatus::Acceptable,
            QualityStatus::NeedsRescan,
            QualityStatus::NeedsCorrection,
        ] {
            assert!(!QualityStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_transition_rules() {
        assert!(QualityStatus::Unchecked.can_transition_to(QualityStatus::NeedsRescan));
        assert!(QualityStatus::NeedsRescan.can_transition_to(QualityStatus::Acceptable));
        assert!(QualityStatus::NeedsRescan.can_transition_to(QualityStatus::Failed));
        assert!(QualityStatus::Acceptable.can_transition_to(QualityStatus::NeedsCorrection));
        assert!(QualityStatus::NeedsCorrection.can_transition_to(QualityStatus::Acceptable));
        // Acceptable never regresses to rescanning automatically.
        assert!(!QualityStatus::Acceptable.can_transition_to(QualityStatus::NeedsRescan));
    }
}
