//! Rescan strategy ladder.
//!
//! Each rescan attempt uses a different extraction configuration, escalating
//! from a more permissive page-segmentation mode through an orientation
//! sweep to the alternate recognition engine. The attempt counter indexes
//! the ladder, so an interrupted attempt restarts with the same strategy.

use serde::{Deserialize, Serialize};

/// Extraction configuration for one rescan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescanStrategy {
    /// Sparse-text page segmentation: finds text the default block
    /// segmentation misses on forms, stamps, and handwriting margins.
    SparseText,
    /// Full page with orientation and script detection, for pages scanned
    /// sideways or upside down.
    OrientationSweep,
    /// Legacy recognition engine instead of LSTM, for degraded typewriter
    /// and dot-matrix sources the neural model gives up on.
    AlternateEngine,
}

impl RescanStrategy {
    /// Strategy for a given attempt index. None once the ladder is exhausted.
    pub fn for_attempt(attempt: i32) -> Option<Self> {
        match attempt {
            0 => Some(Self::SparseText),
            1 => Some(Self::OrientationSweep),
            2 => Some(Self::AlternateEngine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SparseText => "sparse_text",
            Self::OrientationSweep => "orientation_sweep",
            Self::AlternateEngine => "alternate_engine",
        }
    }

    /// Tesseract arguments implementing this strategy.
    pub fn tesseract_args(&self) -> &'static [&'static str] {
        match self {
            Self::SparseText => &["--psm", "11"],
            Self::OrientationSweep => &["--psm", "1"],
            Self::AlternateEngine => &["--oem", "0", "--psm", "3"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        assert_eq!(
            RescanStrategy::for_attempt(0),
            Some(RescanStrategy::SparseText)
        );
        assert_eq!(
            RescanStrategy::for_attempt(1),
            Some(RescanStrategy::OrientationSweep)
        );
        assert_eq!(
            RescanStrategy::for_attempt(2),
            Some(RescanStrategy::AlternateEngine)
        );
        assert_eq!(RescanStrategy::for_attempt(3), None);
        assert_eq!(RescanStrategy::for_attempt(-1), None);
    }

    #[test]
    fn test_args_differ_per_strategy() {
        let a = RescanStrategy::SparseText.tesseract_args();
        let b = RescanStrategy::OrientationSweep.tesseract_args();
        let c = RescanStrategy::AlternateEngine.tesseract_args();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
