use crate::error::{StepCounterError, StepResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Magnitude delta (m/s²) a sample must exceed to count as a step
pub const STEP_THRESHOLD: f64 = 15.0;

/// Minimum spacing between two accepted steps
pub const REFRACTORY_DURATION_MS: u64 = 300;

/// Step detector thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub step_threshold: f64,
    pub refractory_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            step_threshold: STEP_THRESHOLD,
            refractory_ms: REFRACTORY_DURATION_MS,
        }
    }
}

impl DetectorConfig {
    pub fn new(step_threshold: f64, refractory_ms: u64) -> StepResult<Self> {
        let config = Self {
            step_threshold,
            refractory_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StepResult<()> {
        if !self.step_threshold.is_finite() || self.step_threshold <= 0.0 {
            return Err(StepCounterError::InvalidConfig(format!(
                "step_threshold must be a positive number, got {}",
                self.step_threshold
            )));
        }
        if self.refractory_ms == 0 {
            return Err(StepCounterError::InvalidConfig(
                "refractory_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields fall back to the defaults
    pub fn from_json_file(path: &Path) -> StepResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: DetectorConfig = serde_json::from_str(&text)
            .map_err(|e| StepCounterError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!(
            "Loaded detector config from {}: threshold {:.2}, refractory {}ms",
            path.display(),
            config.step_threshold,
            config.refractory_ms
        );
        Ok(config)
    }

    /// Apply command line overrides on top of this config
    pub fn with_overrides(
        mut self,
        step_threshold: Option<f64>,
        refractory_ms: Option<u64>,
    ) -> StepResult<Self> {
        if let Some(threshold) = step_threshold {
            self.step_threshold = threshold;
        }
        if let Some(ms) = refractory_ms {
            self.refractory_ms = ms;
        }
        self.validate()?;
        Ok(self)
    }
}
