use crate::display::{ActivityState, DisplaySink};
use crate::error::StepCounterError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub step_count: u64,
    pub activity: ActivityState,
    pub supported: bool,
    pub unsupported_reason: Option<String>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            step_count: 0,
            activity: ActivityState::Inactive,
            supported: true,
            unsupported_reason: None,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrites a `LiveStatus` JSON file on every notification
pub struct StatusFileSink {
    path: PathBuf,
    status: Mutex<LiveStatus>,
}

impl StatusFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: Mutex::new(LiveStatus::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Option<LiveStatus> {
        self.status.lock().ok().map(|s| s.clone())
    }

    fn update(&self, apply: impl FnOnce(&mut LiveStatus)) {
        let Ok(mut status) = self.status.lock() else {
            warn!("Status lock poisoned, skipping {}", self.path.display());
            return;
        };
        apply(&mut status);
        status.timestamp = current_timestamp();
        if let Err(e) = status.save(&self.path) {
            warn!("Failed to write status file {}: {}", self.path.display(), e);
        }
    }
}

impl DisplaySink for StatusFileSink {
    fn on_step_count_changed(&self, count: u64) {
        self.update(|s| s.step_count = count);
    }

    fn on_activity_changed(&self, state: ActivityState) {
        self.update(|s| {
            s.activity = state;
            if state == ActivityState::Active {
                s.supported = true;
                s.unsupported_reason = None;
            }
        });
    }

    fn on_unsupported(&self, reason: &StepCounterError) {
        self.update(|s| {
            s.supported = false;
            s.unsupported_reason = Some(reason.to_string());
        });
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("step_counter_{}_{}.json", tag, std::process::id()))
    }

    #[test]
    fn test_sink_writes_latest_state() {
        let path = temp_path("status_sink");
        let sink = StatusFileSink::new(&path);

        sink.on_activity_changed(ActivityState::Active);
        sink.on_step_count_changed(3);

        let status = LiveStatus::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(status.step_count, 3);
        assert_eq!(status.activity, ActivityState::Active);
        assert!(status.supported);
        assert_eq!(sink.current().unwrap(), status);
    }

    #[test]
    fn test_sink_records_unsupported_reason() {
        let path = temp_path("status_unsupported");
        let sink = StatusFileSink::new(&path);

        sink.on_unsupported(&StepCounterError::SensorUnavailable("no accelerometer".into()));
        let status = LiveStatus::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert!(!status.supported);
        assert!(status
            .unsupported_reason
            .as_deref()
            .unwrap()
            .contains("no accelerometer"));
        assert_eq!(status.activity, ActivityState::Inactive);
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let sink = StatusFileSink::new("/nonexistent-dir/for/status.json");
        sink.on_step_count_changed(1);
        assert_eq!(sink.current().unwrap().step_count, 1);
    }
}
