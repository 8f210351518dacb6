//! Tesseract OCR engine implementation.
//!
//! Uses Tesseract via command-line for text extraction. This is the
//! traditional, widely-available OCR option.

use std::path::Path;
use std::process::Command;

use super::{check_binary, OcrEngine, OcrError, RescanStrategy};

/// Tesseract OCR engine.
pub struct TesseractEngine {
    /// Tesseract language setting.
    language: String,
}

impl TesseractEngine {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Run Tesseract on an image file with the strategy's arguments.
    fn run_tesseract(
        &self,
        image_path: &Path,
        strategy: RescanStrategy,
    ) -> Result<String, OcrError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(strategy.tesseract_args())
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::ExtractionFailed(format!(
                        "tesseract failed: {}",
                        stderr
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                OcrError::BackendNotAvailable("tesseract not found (install tesseract-ocr)".into()),
            ),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl OcrEngine for TesseractEngine {
    fn extract(&self, image_path: &Path, strategy: RescanStrategy) -> Result<String, OcrError> {
        if !image_path.exists() {
            return Err(OcrError::ImageNotFound(image_path.display().to_string()));
        }
        self.run_tesseract(image_path, strategy)
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }
}
