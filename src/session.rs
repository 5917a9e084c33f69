use crate::config::DetectorConfig;
use crate::display::{ActivityState, DisplaySink};
use crate::error::{StepCounterError, StepResult};
use crate::permission::PermissionGate;
use crate::sensor_receiver::MotionEvent;
use crate::sensors::SensorSource;
use crate::step_detector::StepDetector;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Id of the latest started session; `None` before the first start
    pub session_id: Option<String>,
    pub started_at: Option<String>,
    pub step_count: u64,
    pub activity: ActivityState,
    pub supported: bool,
    pub samples_seen: u64,
    pub discarded_samples: u64,
}

struct SessionShared {
    session_id: Option<String>,
    started_at: Option<String>,
    /// Bumped on every start and stop; a pump only touches state of its own generation
    generation: u64,
    detector: Option<StepDetector>,
    /// Count carried while no detector exists
    retained_steps: u64,
    activity: ActivityState,
    supported: bool,
    samples_seen: u64,
    discarded_samples: u64,
}

impl SessionShared {
    fn step_count(&self) -> u64 {
        self.detector
            .as_ref()
            .map(|d| d.step_count())
            .unwrap_or(self.retained_steps)
    }
}

/// Binds a step detector to a sensor subscription and relays its output
pub struct SessionController<S: SensorSource> {
    gate: PermissionGate,
    source: S,
    config: DetectorConfig,
    display: Arc<dyn DisplaySink>,
    shared: Arc<Mutex<SessionShared>>,
    worker: Option<JoinHandle<()>>,
}

impl<S: SensorSource> SessionController<S> {
    pub fn new(
        gate: PermissionGate,
        source: S,
        config: DetectorConfig,
        display: Arc<dyn DisplaySink>,
    ) -> StepResult<Self> {
        config.validate()?;

        let shared = SessionShared {
            session_id: None,
            started_at: None,
            generation: 0,
            detector: None,
            retained_steps: 0,
            activity: ActivityState::Inactive,
            supported: true,
            samples_seen: 0,
            discarded_samples: 0,
        };

        Ok(SessionController {
            gate,
            source,
            config,
            display,
            shared: Arc::new(Mutex::new(shared)),
            worker: None,
        })
    }

    fn lock(&self) -> StepResult<MutexGuard<'_, SessionShared>> {
        self.shared.lock().map_err(|_| {
            StepCounterError::Internal("Failed to acquire session state lock".to_string())
        })
    }

    /// Ask for permission, subscribe and start counting.
    ///
    /// A no-op while already active. Permission denial or a missing sensor
    /// marks the session unsupported and leaves the step count untouched.
    pub async fn start(&mut self) -> StepResult<()> {
        if self.activity()? == ActivityState::Active {
            debug!("start() while active, ignoring");
            return Ok(());
        }

        if !self.source.is_available() {
            return self.mark_unsupported(StepCounterError::SensorUnavailable(
                "Device motion not supported".to_string(),
            ));
        }

        let decision = self.gate.request_access().await;
        if !decision.allows_sensor() {
            return self.mark_unsupported(StepCounterError::PermissionDenied(
                "Motion sensor permission denied".to_string(),
            ));
        }

        let rx = match self.source.subscribe() {
            Ok(rx) => rx,
            Err(e) => {
                return self.mark_unsupported(StepCounterError::SensorUnavailable(e.to_string()))
            }
        };

        let (generation, carried) = {
            let mut shared = self.lock()?;
            shared.generation += 1;
            let carried = shared.retained_steps;
            shared.detector = Some(StepDetector::with_step_count(self.config, carried));
            shared.activity = ActivityState::Active;
            shared.supported = true;
            let now = Utc::now();
            shared.session_id = Some(format!(
                "session_{}_{}",
                now.timestamp_millis(),
                shared.generation
            ));
            shared.started_at = Some(now.to_rfc3339());
            self.display.on_activity_changed(ActivityState::Active);
            (shared.generation, carried)
        };

        self.worker = Some(tokio::spawn(pump(
            rx,
            self.shared.clone(),
            self.display.clone(),
            generation,
        )));

        info!(
            "Step counting started ({} source, {} steps carried)",
            self.source.name(),
            carried
        );
        Ok(())
    }

    fn mark_unsupported(&self, reason: StepCounterError) -> StepResult<()> {
        let mut shared = self.lock()?;
        shared.supported = false;
        warn!("{}", reason);
        self.display.on_unsupported(&reason);
        Err(reason)
    }

    /// Unsubscribe and discard the detector. Idempotent.
    ///
    /// Once this returns no sample, buffered or late, can change the count.
    pub fn stop(&mut self) -> StepResult<()> {
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
        self.source.unsubscribe();

        let mut shared = self.lock()?;
        shared.generation += 1;
        if let Some(detector) = shared.detector.take() {
            shared.retained_steps = detector.step_count();
        }
        if shared.activity == ActivityState::Active {
            shared.activity = ActivityState::Inactive;
            self.display.on_activity_changed(ActivityState::Inactive);
            info!("Step counting stopped at {} steps", shared.retained_steps);
        }
        Ok(())
    }

    /// Zero the step count. Works in any state and does not touch activity.
    pub fn reset(&self) -> StepResult<()> {
        let mut shared = self.lock()?;
        shared.retained_steps = 0;
        if let Some(detector) = shared.detector.as_mut() {
            detector.reset_count();
        }
        self.display.on_step_count_changed(0);
        info!("Step count reset");
        Ok(())
    }

    pub fn step_count(&self) -> StepResult<u64> {
        Ok(self.lock()?.step_count())
    }

    pub fn activity(&self) -> StepResult<ActivityState> {
        Ok(self.lock()?.activity)
    }

    pub fn is_supported(&self) -> StepResult<bool> {
        Ok(self.lock()?.supported)
    }

    /// True while the current subscription still delivers events
    pub fn is_streaming(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> StepResult<SessionSnapshot> {
        let shared = self.lock()?;
        Ok(SessionSnapshot {
            session_id: shared.session_id.clone(),
            started_at: shared.started_at.clone(),
            step_count: shared.step_count(),
            activity: shared.activity,
            supported: shared.supported,
            samples_seen: shared.samples_seen,
            discarded_samples: shared.discarded_samples,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: SensorSource> Drop for SessionController<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop session on drop: {}", e);
        }
    }
}

async fn pump(
    mut rx: Receiver<MotionEvent>,
    shared: Arc<Mutex<SessionShared>>,
    display: Arc<dyn DisplaySink>,
    generation: u64,
) {
    while let Some(event) = rx.recv().await {
        let Ok(mut state) = shared.lock() else {
            error!("Session state lock poisoned, stopping sensor pump");
            return;
        };
        if state.generation != generation {
            return;
        }

        state.samples_seen += 1;
        if event.acceleration_including_gravity.full().is_none() {
            state.discarded_samples += 1;
        }

        let step = state.detector.as_mut().and_then(|detector| {
            detector.process_sample(&event.acceleration_including_gravity, event.timestamp_ms)
        });
        if let Some(step) = step {
            display.on_step_count_changed(step.step_count);
        }
    }
    debug!("Sensor stream ended (generation {})", generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{FixedPrompt, PermissionPrompt, PromptResponse};
    use crate::sensor_receiver::AccelerationSample;
    use crate::sensors::{ChannelSource, MotionSender};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct Recorder {
        counts: Mutex<Vec<u64>>,
        states: Mutex<Vec<ActivityState>>,
        unsupported: Mutex<Vec<StepCounterError>>,
    }

    impl DisplaySink for Recorder {
        fn on_step_count_changed(&self, count: u64) {
            self.counts.lock().unwrap().push(count);
        }
        fn on_activity_changed(&self, state: ActivityState) {
            self.states.lock().unwrap().push(state);
        }
        fn on_unsupported(&self, reason: &StepCounterError) {
            self.unsupported.lock().unwrap().push(reason.clone());
        }
    }

    fn controller(
        gate: PermissionGate,
    ) -> (SessionController<ChannelSource>, MotionSender, Arc<Recorder>) {
        let (source, sender) = ChannelSource::new();
        let recorder = Arc::new(Recorder::default());
        let session =
            SessionController::new(gate, source, DetectorConfig::default(), recorder.clone())
                .unwrap();
        (session, sender, recorder)
    }

    fn push(sender: &MotionSender, t: u64, z: f64) -> bool {
        sender.push(MotionEvent::new(t, AccelerationSample::new(0.0, 0.0, z)))
    }

    async fn settle() {
        sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_start_counts_steps() {
        let (mut session, sender, recorder) = controller(PermissionGate::implicit());
        assert_eq!(session.activity().unwrap(), ActivityState::Inactive);

        session.start().await.unwrap();
        assert_eq!(session.activity().unwrap(), ActivityState::Active);

        push(&sender, 0, 0.0);
        push(&sender, 50, 20.0);
        push(&sender, 100, 0.0);
        push(&sender, 400, 20.0);
        settle().await;

        assert_eq!(session.step_count().unwrap(), 2);
        assert_eq!(*recorder.counts.lock().unwrap(), vec![1, 2]);
        assert_eq!(*recorder.states.lock().unwrap(), vec![ActivityState::Active]);

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.samples_seen, 4);
        assert_eq!(snapshot.discarded_samples, 0);
        assert!(snapshot.started_at.is_some());
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let (mut session, sender, recorder) = controller(PermissionGate::implicit());
        session.start().await.unwrap();
        push(&sender, 0, 20.0);
        settle().await;

        session.start().await.unwrap();
        assert_eq!(session.step_count().unwrap(), 1);
        assert_eq!(recorder.states.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_marks_unsupported() {
        let gate = PermissionGate::explicit(Arc::new(FixedPrompt::new(PromptResponse::Denied)));
        let (mut session, sender, recorder) = controller(gate);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, StepCounterError::PermissionDenied(_)));
        assert_eq!(session.activity().unwrap(), ActivityState::Inactive);
        assert!(!session.is_supported().unwrap());
        assert_eq!(session.step_count().unwrap(), 0);
        assert_eq!(recorder.unsupported.lock().unwrap().len(), 1);
        assert!(recorder.states.lock().unwrap().is_empty());

        // Nothing is subscribed
        assert!(!push(&sender, 0, 20.0));
    }

    #[tokio::test]
    async fn test_denial_keeps_prior_count() {
        let (source, sender) = ChannelSource::new();
        let recorder = Arc::new(Recorder::default());
        let mut session = SessionController::new(
            PermissionGate::implicit(),
            source,
            DetectorConfig::default(),
            recorder.clone(),
        )
        .unwrap();

        session.start().await.unwrap();
        push(&sender, 0, 20.0);
        settle().await;
        session.stop().unwrap();

        session.gate =
            PermissionGate::explicit(Arc::new(FixedPrompt::new(PromptResponse::Denied)));
        assert!(session.start().await.is_err());
        assert_eq!(session.step_count().unwrap(), 1);
    }

    struct SecondTimeLucky {
        asked: AtomicBool,
    }

    #[async_trait]
    impl PermissionPrompt for SecondTimeLucky {
        async fn prompt(&self) -> StepResult<PromptResponse> {
            if self.asked.swap(true, Ordering::SeqCst) {
                Ok(PromptResponse::Granted)
            } else {
                Ok(PromptResponse::Denied)
            }
        }
    }

    #[tokio::test]
    async fn test_re_request_after_denial() {
        let gate = PermissionGate::explicit(Arc::new(SecondTimeLucky {
            asked: AtomicBool::new(false),
        }));
        let (mut session, sender, recorder) = controller(gate);

        assert!(session.start().await.is_err());
        assert!(!session.is_supported().unwrap());

        session.start().await.unwrap();
        assert!(session.is_supported().unwrap());
        assert_eq!(session.activity().unwrap(), ActivityState::Active);
        assert!(push(&sender, 0, 20.0));
        settle().await;
        assert_eq!(session.step_count().unwrap(), 1);
        assert_eq!(recorder.unsupported.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_sensor() {
        let (source, _sender) = ChannelSource::unavailable();
        let recorder = Arc::new(Recorder::default());
        let mut session = SessionController::new(
            PermissionGate::implicit(),
            source,
            DetectorConfig::default(),
            recorder.clone(),
        )
        .unwrap();

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, StepCounterError::SensorUnavailable(_)));
        assert!(!session.is_supported().unwrap());
        assert!(matches!(
            recorder.unsupported.lock().unwrap()[0],
            StepCounterError::SensorUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_stop_rejects_late_samples() {
        let (mut session, sender, recorder) = controller(PermissionGate::implicit());
        session.start().await.unwrap();
        push(&sender, 0, 20.0);
        settle().await;
        assert_eq!(session.step_count().unwrap(), 1);

        // Queued but not yet processed when stop() runs
        push(&sender, 400, 0.0);
        session.stop().unwrap();
        assert!(!push(&sender, 800, 20.0));
        settle().await;

        assert_eq!(session.step_count().unwrap(), 1);
        assert_eq!(session.activity().unwrap(), ActivityState::Inactive);
        assert_eq!(*recorder.counts.lock().unwrap(), vec![1]);
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![ActivityState::Active, ActivityState::Inactive]
        );
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut session, _sender, recorder) = controller(PermissionGate::implicit());
        session.stop().unwrap();
        session.start().await.unwrap();
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec![ActivityState::Active, ActivityState::Inactive]
        );
    }

    #[tokio::test]
    async fn test_restart_carries_count_with_fresh_state() {
        let (mut session, sender, _recorder) = controller(PermissionGate::implicit());
        session.start().await.unwrap();
        push(&sender, 0, 20.0);
        settle().await;
        session.stop().unwrap();

        session.start().await.unwrap();
        // Fresh detector: compared against the zero vector, no refractory window
        push(&sender, 10, 20.0);
        settle().await;
        assert_eq!(session.step_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_each_start_gets_a_new_session_id() {
        let (mut session, _sender, _recorder) = controller(PermissionGate::implicit());
        let idle = session.snapshot().unwrap();
        assert_eq!(idle.session_id, None);
        assert_eq!(idle.started_at, None);

        session.start().await.unwrap();
        let first = session.snapshot().unwrap();
        session.stop().unwrap();
        // Stopping keeps the id of the session that just ended
        assert_eq!(session.snapshot().unwrap().session_id, first.session_id);

        session.start().await.unwrap();
        let second = session.snapshot().unwrap();
        assert!(first.session_id.is_some());
        assert!(second.session_id.is_some());
        assert_ne!(first.session_id, second.session_id);
        assert!(second.started_at.is_some());
    }

    #[tokio::test]
    async fn test_reset_in_any_state() {
        let (mut session, sender, recorder) = controller(PermissionGate::implicit());
        session.reset().unwrap();
        assert_eq!(session.step_count().unwrap(), 0);

        session.start().await.unwrap();
        push(&sender, 0, 20.0);
        settle().await;
        session.reset().unwrap();
        assert_eq!(session.step_count().unwrap(), 0);
        assert_eq!(session.activity().unwrap(), ActivityState::Active);

        session.stop().unwrap();
        session.reset().unwrap();
        session.reset().unwrap();
        assert_eq!(session.step_count().unwrap(), 0);
        assert_eq!(session.activity().unwrap(), ActivityState::Inactive);
        assert_eq!(*recorder.counts.lock().unwrap(), vec![0, 1, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_malformed_samples_are_counted_but_ignored() {
        let (mut session, sender, _recorder) = controller(PermissionGate::implicit());
        session.start().await.unwrap();
        sender.push(MotionEvent::new(
            0,
            AccelerationSample {
                x: Some(0.0),
                y: None,
                z: Some(40.0),
            },
        ));
        settle().await;

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.step_count, 0);
        assert_eq!(snapshot.samples_seen, 1);
        assert_eq!(snapshot.discarded_samples, 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let (source, _sender) = ChannelSource::new();
        let config = DetectorConfig {
            step_threshold: 15.0,
            refractory_ms: 0,
        };
        let result = SessionController::new(
            PermissionGate::implicit(),
            source,
            config,
            Arc::new(Recorder::default()),
        );
        assert!(matches!(result, Err(StepCounterError::InvalidConfig(_))));
    }
}
