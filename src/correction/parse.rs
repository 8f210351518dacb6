//! Lenient-then-strict parsing of the Round-2 assessment response.
//!
//! Models return near-valid JSON often enough that strict parsing alone
//! throws away good work: fenced code blocks, leading prose, trailing
//! commentary, capitalized enum values, trailing commas. Recovery handles
//! those. Anything still unparsable is a hard failure for the attempt;
//! an unreadable assessment must never masquerade as a low-score success.

use serde_json::Value;

use crate::models::CorrectionAssessment;

/// Parse an assessment response. Returns the assessment plus the canonical
/// JSON actually parsed (stored verbatim alongside the correction).
pub fn parse_assessment(raw: &str) -> Option<(CorrectionAssessment, String)> {
    let trimmed = raw.trim();

    // Strict pass first, recovery only when it fails.
    let (assessment, canonical) =
        if let Ok(assessment) = serde_json::from_str::<CorrectionAssessment>(trimmed) {
            (assessment, trimmed.to_string())
        } else {
            let candidate = extract_json_object(trimmed)?;
            let value = parse_value_lenient(&candidate)?;
            let value = normalize(value);
            let canonical = value.to_string();
            (
                serde_json::from_value::<CorrectionAssessment>(value).ok()?,
                canonical,
            )
        };

    if !(1..=100).contains(&assessment.quality_score) {
        return None;
    }

    Some((assessment, canonical))
}

/// Extract the outermost `{...}` from surrounding prose or code fences.
fn extract_json_object(text: &str) -> Option<String> {
    // Prefer fenced content when present.
    let text = if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
    } else {
        text
    };

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse to a Value, tolerating trailing commas.
fn parse_value_lenient(candidate: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    let re = regex::Regex::new(r",\s*([}\]])").ok()?;
    let repaired = re.replace_all(candidate, "$1");
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Normalize value shapes models get wrong: capitalized enum strings and
/// numeric scores delivered as strings.
fn normalize(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        for key in ["improvement_level", "confidence"] {
            if let Some(Value::String(s)) = obj.get_mut(key) {
                *s = s.trim().to_lowercase();
            }
        }
        let coerced = obj
            .get("quality_score")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse::<i64>().ok());
        if let Some(n) = coerced {
            obj.insert("quality_score".to_string(), Value::from(n));
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, ImprovementLevel};

    const VALID: &str = r#"{
        "quality_score": 85,
        "improvement_level": "significant",
        "major_corrections": ["fixed spacing", "corrected proper names"],
        "confidence": "high",
        "needs_review": false
    }"#;

    #[test]
    fn test_strict_parse() {
        let (a, _) = parse_assessment(VALID).unwrap();
        assert_eq!(a.quality_score, 85);
        assert_eq!(a.improvement_level, ImprovementLevel::Significant);
        assert_eq!(a.confidence, Confidence::High);
        assert!(!a.needs_review);
        assert_eq!(a.major_corrections.len(), 2);
    }

    #[test]
    fn test_trailing_commentary() {
        let raw = format!("Here is my assessment:\n{}\nLet me know if you need more detail!", VALID);
        let (a, _) = parse_assessment(&raw).unwrap();
        assert_eq!(a.quality_score, 85);
    }

    #[test]
    fn test_code_fence() {
        let raw = format!("```json\n{}\n```", VALID);
        let (a, _) = parse_assessment(&raw).unwrap();
        assert_eq!(a.quality_score, 85);
    }

    #[test]
    fn test_trailing_comma_and_capitalized_values() {
        let raw = r#"{
            "quality_score": 70,
            "improvement_level": "Moderate",
            "major_corrections": ["joined hyphenated words",],
            "confidence": "Medium",
            "needs_review": true,
        }"#;
        let (a, _) = parse_assessment(raw).unwrap();
        assert_eq!(a.quality_score, 70);
        assert_eq!(a.improvement_level, ImprovementLevel::Moderate);
        assert_eq!(a.confidence, Confidence::Medium);
        assert!(a.needs_review);
    }

    #[test]
    fn test_score_as_string() {
        let raw = r#"{"quality_score": "92", "improvement_level": "minimal", "confidence": "high", "needs_review": false}"#;
        let (a, _) = parse_assessment(raw).unwrap();
        assert_eq!(a.quality_score, 92);
    }

    #[test]
    fn test_unparsable_is_none() {
        assert!(parse_assessment("I could not assess the correction.").is_none());
        assert!(parse_assessment("").is_none());
        assert!(parse_assessment("{broken json").is_none());
        // Valid JSON but missing required fields
        assert!(parse_assessment(r#"{"verdict": "good"}"#).is_none());
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let raw = r#"{"quality_score": 0, "improvement_level": "minimal", "confidence": "high", "needs_review": false}"#;
        assert!(parse_assessment(raw).is_none());
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"noise {"quality_score": 55, "improvement_level": "moderate", "major_corrections": ["fixed {brackets} in text"], "confidence": "low", "needs_review": true} tail"#;
        let (a, _) = parse_assessment(raw).unwrap();
        assert_eq!(a.quality_score, 55);
        assert!(a.needs_review);
    }
}
