use thiserror::Error;

/// Step counter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepCounterError {
    #[error("Motion sensor permission denied: {0}")]
    PermissionDenied(String),

    #[error("Motion sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Invalid detector config: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed motion log: {0}")]
    LogFormat(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StepCounterError {
    /// Errors that put the session on the unsupported path
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            StepCounterError::PermissionDenied(_) | StepCounterError::SensorUnavailable(_)
        )
    }
}

impl From<std::io::Error> for StepCounterError {
    fn from(err: std::io::Error) -> Self {
        StepCounterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StepCounterError {
    fn from(err: serde_json::Error) -> Self {
        StepCounterError::LogFormat(err.to_string())
    }
}

/// Result type for step counter operations
pub type StepResult<T> = Result<T, StepCounterError>;
