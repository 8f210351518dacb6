//! Prompt templates for the two correction rounds.

/// Round 1: repair OCR artifacts without touching meaning.
const CORRECTION_PROMPT: &str = r#"You are an expert legal document OCR correction specialist. Your task is to correct OCR errors in scanned documents while preserving the original meaning and legal terminology.

DOCUMENT CONTEXT:
- Document Type: {document_type}

CORRECTION GUIDELINES:
1. Fix obvious OCR errors (character recognition mistakes)
2. Correct spacing and punctuation
3. Preserve legal terminology and proper names
4. Maintain original document structure
5. Do not add content not present in the original
6. Flag uncertain corrections with [UNCERTAIN: reason]

CRITICAL RESTRICTIONS - DO NOT:
- Change the meaning or substance of any legal text
- Modify legal arguments, claims, or statements
- Alter dates, numbers, or factual content
- Rewrite or rephrase sentences for clarity
- Add interpretation or commentary
- Change legal citations or references
- Modify signatures, names, or official designations
- Transform the document in any substantive way

REMEMBER: You are correcting OCR/transcription errors ONLY, not improving or modifying the document content itself.

INPUT TEXT:
{text}

Provide ONLY the corrected text. Do not include any explanations or scores."#;

/// Round 2: compare original and corrected text, return structured JSON.
const ASSESSMENT_PROMPT: &str = r#"You are an OCR correction quality assessor. Compare the original OCR text with the corrected version and provide a JSON assessment.

ORIGINAL OCR TEXT:
{original}

CORRECTED TEXT:
{corrected}

Provide a JSON response with the following structure:
{
  "quality_score": 85,
  "improvement_level": "significant",
  "major_corrections": ["fixed spacing", "corrected proper names"],
  "confidence": "high",
  "needs_review": false
}

Valid values:
- quality_score: 1-100 (overall quality of correction)
- improvement_level: "minimal", "moderate", "significant", "substantial"
- major_corrections: array of strings describing key improvements
- confidence: "low", "medium", "high"
- needs_review: boolean (true if human review recommended)"#;

pub fn correction_prompt(text: &str, document_type: &str) -> String {
    CORRECTION_PROMPT
        .replace("{document_type}", document_type)
        .replace("{text}", text)
}

pub fn assessment_prompt(original: &str, corrected: &str) -> String {
    ASSESSMENT_PROMPT
        .replace("{original}", original)
        .replace("{corrected}", corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_prompt_substitution() {
        let p = correction_prompt("Th1s 1s a t3st", "Deposition Transcript");
        assert!(p.contains("Th1s 1s a t3st"));
        assert!(p.contains("Deposition Transcript"));
        assert!(!p.contains("{text}"));
        assert!(!p.contains("{document_type}"));
    }

    #[test]
    fn test_assessment_prompt_keeps_json_skeleton() {
        let p = assessment_prompt("before", "after");
        assert!(p.contains("before"));
        assert!(p.contains("after"));
        // The literal JSON example must survive the placeholder substitution.
        assert!(p.contains("\"quality_score\": 85"));
    }
}
