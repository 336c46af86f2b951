//! Pipeline configuration.
//!
//! Layered the usual way: compiled defaults, then an optional YAML file, then
//! environment overrides. Every field has a default so an empty file is a
//! valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Runtime configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Length of the recent comparison window, in days.
    pub recent_days: u32,
    /// Minimum evaluator confidence for a hypothesis to be accepted.
    pub confidence_min: f64,
    /// Seed for the deterministic creative generator.
    pub random_seed: u64,
    /// Model name for all model-backed stages.
    pub model: String,
    /// Sampling temperature for model-backed stages.
    pub temperature: f64,
    /// Token cap for model responses.
    pub max_tokens: u32,
    /// Whether the model path is enabled at all.
    pub llm_enabled: bool,
    /// Directory where run artifacts are written.
    pub out_dir: PathBuf,
    /// Path of the append-only run trace log.
    pub logs_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_days: 7,
            confidence_min: 0.6,
            random_seed: 42,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            llm_enabled: false,
            out_dir: PathBuf::from("reports"),
            logs_path: PathBuf::from("logs/traces.json"),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a YAML file, with defaults for absent keys.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides on top of the current values.
    ///
    /// Recognized variables: `INSIGHT_FORGE_MODEL`, `INSIGHT_FORGE_OUT_DIR`,
    /// `INSIGHT_FORGE_CONFIDENCE_MIN`, `INSIGHT_FORGE_SEED`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("INSIGHT_FORGE_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        if let Ok(dir) = std::env::var("INSIGHT_FORGE_OUT_DIR") {
            if !dir.trim().is_empty() {
                self.out_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var("INSIGHT_FORGE_CONFIDENCE_MIN") {
            if let Ok(v) = raw.parse::<f64>() {
                self.confidence_min = v;
            }
        }
        if let Ok(raw) = std::env::var("INSIGHT_FORGE_SEED") {
            if let Ok(v) = raw.parse::<u64>() {
                self.random_seed = v;
            }
        }
        self
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_min) {
            return Err(ConfigError::Invalid(format!(
                "confidence_min must be in [0, 1], got {}",
                self.confidence_min
            )));
        }
        if self.recent_days == 0 {
            return Err(ConfigError::Invalid(
                "recent_days must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be in [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}
