// Step Counter Library
// Turns a live accelerometer stream into a step count for a display layer

pub mod config;
pub mod display;
pub mod error;
pub mod live_status;
pub mod permission;
pub mod sensor_receiver;
pub mod sensors;
pub mod session;
pub mod step_detector;

pub use config::{DetectorConfig, REFRACTORY_DURATION_MS, STEP_THRESHOLD};
pub use display::{ActivityState, DisplaySink, FanOut, LogDisplay};
pub use error::{StepCounterError, StepResult};
pub use live_status::{LiveStatus, StatusFileSink};
pub use permission::{
    AccessDecision, FixedPrompt, PermissionGate, PermissionPrompt, Platform, PromptResponse,
};
pub use sensor_receiver::{AccelerationSample, MotionEvent, MotionLog};
pub use sensors::{
    ChannelSource, MotionSender, ReplaySource, SensorSource, SimulatedWalk, WalkProfile,
};
pub use session::{SessionController, SessionSnapshot};
pub use step_detector::{StepDetector, StepEvent};
