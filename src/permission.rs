use crate::error::{StepCounterError, StepResult};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Outcome of the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    Granted,
    Denied,
    /// Platform has no explicit permission model
    NotRequired,
}

impl AccessDecision {
    pub fn allows_sensor(self) -> bool {
        matches!(self, AccessDecision::Granted | AccessDecision::NotRequired)
    }
}

/// Raw answer of a platform permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptResponse {
    Granted,
    Denied,
    /// User dismissed the prompt without answering
    Default,
}

impl FromStr for PromptResponse {
    type Err = StepCounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(PromptResponse::Granted),
            "denied" => Ok(PromptResponse::Denied),
            "default" => Ok(PromptResponse::Default),
            other => Err(StepCounterError::InvalidInput(format!(
                "Unknown permission response: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PromptResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PromptResponse::Granted => "granted",
            PromptResponse::Denied => "denied",
            PromptResponse::Default => "default",
        };
        f.write_str(s)
    }
}

/// Platform hook that asks the user for motion sensor access
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn prompt(&self) -> StepResult<PromptResponse>;
}

/// Prompt that always answers the same way
#[derive(Debug, Clone)]
pub struct FixedPrompt {
    response: StepResult<PromptResponse>,
}

impl FixedPrompt {
    pub fn new(response: PromptResponse) -> Self {
        Self {
            response: Ok(response),
        }
    }

    /// Prompt whose platform call fails
    pub fn failing(error: StepCounterError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[async_trait]
impl PermissionPrompt for FixedPrompt {
    async fn prompt(&self) -> StepResult<PromptResponse> {
        self.response.clone()
    }
}

/// Permission capability of the host platform
#[derive(Clone)]
pub enum Platform {
    RequiresExplicitPermission(Arc<dyn PermissionPrompt>),
    ImplicitlyGranted,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::RequiresExplicitPermission(_) => f.write_str("RequiresExplicitPermission"),
            Platform::ImplicitlyGranted => f.write_str("ImplicitlyGranted"),
        }
    }
}

/// One-shot authorization check run before subscribing to the sensor
#[derive(Debug, Clone)]
pub struct PermissionGate {
    platform: Platform,
}

impl PermissionGate {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn implicit() -> Self {
        Self::new(Platform::ImplicitlyGranted)
    }

    pub fn explicit(prompt: Arc<dyn PermissionPrompt>) -> Self {
        Self::new(Platform::RequiresExplicitPermission(prompt))
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Ask once. Prompt errors fold into `Denied`; there is no retry.
    pub async fn request_access(&self) -> AccessDecision {
        match &self.platform {
            Platform::ImplicitlyGranted => AccessDecision::NotRequired,
            Platform::RequiresExplicitPermission(prompt) => match prompt.prompt().await {
                Ok(PromptResponse::Granted) => {
                    info!("Motion sensor permission granted");
                    AccessDecision::Granted
                }
                Ok(response) => {
                    warn!("Motion sensor permission not granted ({})", response);
                    AccessDecision::Denied
                }
                Err(e) => {
                    warn!("Permission request failed: {}", e);
                    AccessDecision::Denied
                }
            },
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::implicit()
    }
}
