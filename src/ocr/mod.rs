//! OCR extraction module.
//!
//! Text extraction from page images using Tesseract via the command line.
//! The `OcrEngine` trait keeps the extraction call opaque to the rest of the
//! pipeline: it takes an image path and a strategy and returns text, which
//! may be empty or garbage. Judging the output is the quality assessor's job.

mod strategy;
mod tesseract;

use std::path::Path;
use std::process::Command;

use thiserror::Error;

pub use strategy::RescanStrategy;
pub use tesseract::TesseractEngine;

/// Errors that can occur during OCR extraction.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An OCR extraction backend.
///
/// Implementations are synchronous; callers run them under `spawn_blocking`.
pub trait OcrEngine: Send + Sync {
    /// Extract text from an image using the given strategy.
    fn extract(&self, image_path: &Path, strategy: RescanStrategy) -> Result<String, OcrError>;

    /// Whether the backend's tools are installed.
    fn is_available(&self) -> bool;
}

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
