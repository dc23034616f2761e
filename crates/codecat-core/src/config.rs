//! Pipeline configuration.
//!
//! [`PipelineConfig`] is the serde-facing, editable form. It is checked once
//! by [`PipelineConfig::validate`], which produces the immutable [`Settings`]
//! shared by every generation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::rubric::{Rubric, RubricConfig};
use crate::scoring::ScoreWeights;
use crate::selection::SelectionConfig;

pub const ENV_HEURISTIC_WEIGHT: &str = "CODECAT_HEURISTIC_WEIGHT";
pub const ENV_MAX_FILES: &str = "CODECAT_MAX_FILES";
pub const ENV_MAX_TOTAL_BYTES: &str = "CODECAT_MAX_TOTAL_BYTES";
pub const ENV_MAX_ATTEMPTS: &str = "CODECAT_MAX_ATTEMPTS";
pub const ENV_CALL_TIMEOUT_SECS: &str = "CODECAT_CALL_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rubric: RubricConfig,
    pub weights: ScoreWeights,
    pub selection: SelectionConfig,
    pub retry: RetryPolicy,
}

/// Validated configuration. Build it once at startup and share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rubric: Rubric,
    pub weights: ScoreWeights,
    pub selection: SelectionConfig,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Defaults overlaid with `CODECAT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(weight) = parse_var::<f64>(&lookup, ENV_HEURISTIC_WEIGHT)? {
            self.weights = ScoreWeights {
                qualitative_max: self.weights.qualitative_max,
                ..ScoreWeights::with_heuristic(weight)
            };
        }
        if let Some(max_files) = parse_var(&lookup, ENV_MAX_FILES)? {
            self.selection.max_files = max_files;
        }
        if let Some(bytes) = parse_var(&lookup, ENV_MAX_TOTAL_BYTES)? {
            self.selection.max_total_bytes = bytes;
        }
        if let Some(attempts) = parse_var(&lookup, ENV_MAX_ATTEMPTS)? {
            self.retry.max_attempts = attempts;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_CALL_TIMEOUT_SECS)? {
            self.retry = self.retry.with_all_timeouts(secs.saturating_mul(1_000));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let rubric = self.rubric.validate()?;
        self.weights.validate()?;
        self.selection.validate()?;
        self.retry.validate()?;
        Ok(Settings {
            rubric,
            weights: self.weights,
            selection: self.selection.clone(),
            retry: self.retry,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
    }
}
