use crate::error::StepCounterError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Liveness of the sensor subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityState {
    Inactive,
    Active,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Inactive => f.write_str("INACTIVE"),
            ActivityState::Active => f.write_str("ACTIVE"),
        }
    }
}

/// Outbound notifications consumed by whatever renders the step count.
///
/// Called from the sensor pump while the session state lock is held, so
/// implementations must not call back into the session controller.
pub trait DisplaySink: Send + Sync {
    fn on_step_count_changed(&self, count: u64);
    fn on_activity_changed(&self, state: ActivityState);
    fn on_unsupported(&self, reason: &StepCounterError);
}

/// Writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn on_step_count_changed(&self, count: u64) {
        let noun = if count == 1 { "step" } else { "steps" };
        info!("{} {}", count, noun);
    }

    fn on_activity_changed(&self, state: ActivityState) {
        match state {
            ActivityState::Active => info!("Counting steps..."),
            ActivityState::Inactive => info!("Sensor inactive"),
        }
    }

    fn on_unsupported(&self, reason: &StepCounterError) {
        warn!("Step counting unavailable: {}", reason);
    }
}

/// Forwards each notification to several sinks in order
#[derive(Default, Clone)]
pub struct FanOut {
    sinks: Vec<Arc<dyn DisplaySink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DisplaySink for FanOut {
    fn on_step_count_changed(&self, count: u64) {
        for sink in &self.sinks {
            sink.on_step_count_changed(count);
        }
    }

    fn on_activity_changed(&self, state: ActivityState) {
        for sink in &self.sinks {
            sink.on_activity_changed(state);
        }
    }

    fn on_unsupported(&self, reason: &StepCounterError) {
        for sink in &self.sinks {
            sink.on_unsupported(reason);
        }
    }
}
