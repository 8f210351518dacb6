//! Correction record models.
//!
//! A correction is an LLM-repaired variant of a page's OCR text, stored
//! append-only next to the verbatim original. The latest record per page is
//! authoritative for display; originals are never deleted or overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical trust level attached to a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// How much the correction changed relative to the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementLevel {
    Minimal,
    Moderate,
    Significant,
    Substantial,
}

impl ImprovementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Moderate => "moderate",
            Self::Significant => "significant",
            Self::Substantial => "substantial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "minimal" => Some(Self::Minimal),
            "moderate" => Some(Self::Moderate),
            "significant" => Some(Self::Significant),
            "substantial" => Some(Self::Substantial),
            _ => None,
        }
    }
}

/// Structured result of the second correction round.
///
/// Deserialized from the assessment model's JSON response. Parsing is
/// lenient at the transport layer (see `correction::parse`); once this
/// struct exists the values are trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionAssessment {
    /// Overall quality of the correction, 1-100.
    pub quality_score: i32,
    pub improvement_level: ImprovementLevel,
    /// Key improvements, as short human-readable phrases.
    #[serde(default)]
    pub major_corrections: Vec<String>,
    pub confidence: Confidence,
    /// Whether human review is recommended.
    #[serde(default)]
    pub needs_review: bool,
}

impl CorrectionAssessment {
    /// Whether this correction must be routed to a human before display.
    pub fn requires_review(&self) -> bool {
        self.needs_review || self.confidence == Confidence::Low
    }
}

/// A persisted correction: both rounds succeeded and the result was stored.
#[derive(Debug, Clone)]
pub struct CorrectionRecord {
    pub id: i64,
    pub page_id: String,
    pub original_text: String,
    pub corrected_text: String,
    pub quality_score: i32,
    pub improvement_level: ImprovementLevel,
    pub confidence: Confidence,
    pub needs_review: bool,
    pub major_corrections: Vec<String>,
    pub model: String,
    pub api_cost_usd: f64,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_review() {
        let mut assessment = CorrectionAssessment {
            quality_score: 90,
            improvement_level: ImprovementLevel::Moderate,
            major_corrections: vec![],
            confidence: Confidence::High,
            needs_review: false,
        };
        assert!(!assessment.requires_review());

        assessment.confidence = Confidence::Low;
        assert!(assessment.requires_review());

        assessment.confidence = Confidence::High;
        assessment.needs_review = true;
        assert!(assessment.requires_review());
    }

    #[test]
    fn test_enum_round_trip() {
        assert_eq!(Confidence::from_str("medium"), Some(Confidence::Medium));
        assert_eq!(
            ImprovementLevel::from_str("substantial"),
            Some(ImprovementLevel::Substantial)
        );
        assert_eq!(ImprovementLevel::from_str("huge"), None);
    }
}
