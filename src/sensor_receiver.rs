use crate::error::{StepCounterError, StepResult};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Acceleration including gravity, as reported by the platform motion event.
/// Any axis may be missing when the sensor hiccups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// All three components, or `None` if any axis is missing
    pub fn full(&self) -> Option<[f64; 3]> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        }
    }

    pub fn magnitude(&self) -> Option<f64> {
        self.full().map(magnitude)
    }
}

/// Euclidean norm of a 3-vector
pub fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// One platform motion callback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    /// Milliseconds on the sensor clock
    pub timestamp_ms: u64,
    pub acceleration_including_gravity: AccelerationSample,
}

impl MotionEvent {
    pub fn new(timestamp_ms: u64, acceleration_including_gravity: AccelerationSample) -> Self {
        Self {
            timestamp_ms,
            acceleration_including_gravity,
        }
    }
}

/// Recorded stream of motion events (`.json` or `.json.gz`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MotionLog {
    pub events: Vec<MotionEvent>,
}

impl MotionLog {
    pub fn load(path: &Path) -> StepResult<Self> {
        let file = File::open(path)?;
        let log: MotionLog = if path.extension().map(|e| e == "gz").unwrap_or(false) {
            let gz = GzDecoder::new(file);
            serde_json::from_reader(BufReader::new(gz))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };

        log.validate()
            .map_err(|e| StepCounterError::LogFormat(format!("{}: {}", path.display(), e)))?;
        Ok(log)
    }

    pub fn from_json(json: &str) -> StepResult<Self> {
        let log: MotionLog = serde_json::from_str(json)?;
        log.validate()?;
        Ok(log)
    }

    /// Timestamps must never go backwards
    pub fn validate(&self) -> StepResult<()> {
        match self
            .events
            .windows(2)
            .position(|w| w[1].timestamp_ms < w[0].timestamp_ms)
        {
            Some(i) => Err(StepCounterError::LogFormat(format!(
                "timestamps are not monotonic at event {}",
                i + 1
            ))),
            None => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
