//! Magnitude-delta step detection.
//!
//! Each full sample is compared with the previous one. When the change in
//! acceleration magnitude exceeds the step threshold and no refractory window
//! is open, a step is counted and a new window opens. The window is a deadline
//! compared on the next call, so the detector is a plain function of
//! (state, sample, now) with no timers.

use crate::config::DetectorConfig;
use crate::sensor_receiver::{magnitude, AccelerationSample};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// An accepted step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub timestamp_ms: u64,
    /// Magnitude of the triggering sample
    pub magnitude: f64,
    /// Magnitude change relative to the previous sample
    pub delta: f64,
    /// Step count after this step
    pub step_count: u64,
}

pub struct StepDetector {
    config: DetectorConfig,
    last_sample: [f64; 3],
    refractory_until: Option<u64>,
    step_count: u64,
}

impl StepDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_step_count(config, 0)
    }

    /// Fresh detector state that continues counting from `step_count`
    pub fn with_step_count(config: DetectorConfig, step_count: u64) -> Self {
        Self {
            config,
            last_sample: [0.0; 3],
            refractory_until: None,
            step_count,
        }
    }

    /// Process one sample taken at `now_ms`.
    /// Returns a StepEvent if a step was detected, None otherwise.
    pub fn process_sample(&mut self, sample: &AccelerationSample, now_ms: u64) -> Option<StepEvent> {
        let Some(current) = sample.full() else {
            trace!("Discarding sample with missing axis at {}ms: {:?}", now_ms, sample);
            return None;
        };

        let current_magnitude = magnitude(current);
        let delta = (current_magnitude - magnitude(self.last_sample)).abs();
        self.last_sample = current;

        // A NaN delta compares false and must never count
        if !(delta > self.config.step_threshold) || self.in_refractory(now_ms) {
            return None;
        }

        self.step_count += 1;
        self.refractory_until = Some(now_ms.saturating_add(self.config.refractory_ms));
        debug!(
            "Step {} at {}ms (magnitude {:.2}, delta {:.2})",
            self.step_count, now_ms, current_magnitude, delta
        );

        Some(StepEvent {
            timestamp_ms: now_ms,
            magnitude: current_magnitude,
            delta,
            step_count: self.step_count,
        })
    }

    /// True while a step accepted earlier still blocks new ones
    pub fn in_refractory(&self, now_ms: u64) -> bool {
        self.refractory_until
            .map(|deadline| now_ms < deadline)
            .unwrap_or(false)
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Zero the count. Sample history and refractory window are kept.
    pub fn reset_count(&mut self) {
        self.step_count = 0;
    }

    pub fn last_sample(&self) -> [f64; 3] {
        self.last_sample
    }

    pub fn refractory_until(&self) -> Option<u64> {
        self.refractory_until
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
