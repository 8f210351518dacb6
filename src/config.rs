//! Configuration management.
//!
//! Settings come from a TOML file (explicit path, `./pagelift.toml`, or the
//! user config directory, in that order), with serde defaults for anything
//! unset and `.env` loading for secrets. Every detection threshold and
//! budget knob lives here rather than in code; the defaults are starting
//! points for tuning, not constants.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::correction::CorrectionConfig;
use crate::cost::CostConfig;
use crate::llm::LlmConfig;
use crate::quality::QualityConfig;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_database_path() -> PathBuf {
    PathBuf::from("pagelift.db")
}
fn default_workers() -> usize {
    4
}
fn default_claim_ttl_minutes() -> i64 {
    90
}
fn default_max_attempts() -> i32 {
    3
}
fn default_language() -> String {
    "eng".to_string()
}

/// Rescan engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescanConfig {
    /// Maximum rescan attempts per page.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Tesseract language setting.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for RescanConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            language: default_language(),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the image/text data tree.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Worker pool size for pipeline runs.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Minutes before a worker claim is considered stale and reclaimable.
    #[serde(default = "default_claim_ttl_minutes")]
    pub claim_ttl_minutes: i64,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub rescan: RescanConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cost: CostConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            workers: default_workers(),
            claim_ttl_minutes: default_claim_ttl_minutes(),
            quality: QualityConfig::default(),
            rescan: RescanConfig::default(),
            correction: CorrectionConfig::default(),
            llm: LlmConfig::default(),
            cost: CostConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when no config file exists.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = Self::discover(explicit);

        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)?;
                toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?
            }
            None => Self::default(),
        };

        settings.data_dir = expand(&settings.data_dir);
        settings.database_path = expand(&settings.database_path);
        settings.llm = settings.llm.with_env_key();

        Ok(settings)
    }

    fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from("pagelift.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("pagelift").join("pagelift.toml");
            if user.exists() {
                return Some(user);
            }
        }
        None
    }

    /// Database URL for the connection factory.
    pub fn database_url(&self) -> String {
        self.database_path.display().to_string()
    }

    /// Claim TTL as a duration.
    pub fn claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.claim_ttl_minutes.max(1))
    }
}

fn expand(path: &Path) -> PathBuf {
    let s = path.display().to_string();
    PathBuf::from(shellexpand::tilde(&s).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.rescan.max_attempts, 3);
        assert_eq!(settings.quality.min_text_len, 10);
        assert!((settings.cost.token_buffer - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Settings = toml::from_str(
            r#"
            workers = 2

            [rescan]
            max_attempts = 5

            [cost]
            max_daily_cost_usd = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(parsed.workers, 2);
        assert_eq!(parsed.rescan.max_attempts, 5);
        assert!((parsed.cost.max_daily_cost_usd - 2.5).abs() < 1e-9);
        // Unset sections keep their defaults
        assert_eq!(parsed.quality.min_text_len, 10);
        assert!(parsed.correction.enabled);
    }
}
