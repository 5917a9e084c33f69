use crate::error::{StepCounterError, StepResult};
use crate::sensor_receiver::{AccelerationSample, MotionEvent, MotionLog};
use log::{debug, info, trace};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant};

/// Channel capacity of one sensor subscription
pub const SUBSCRIPTION_CAPACITY: usize = 500;

const GRAVITY: f64 = 9.81;

/// Producer of acceleration-including-gravity events.
///
/// At most one subscription is live at a time: `subscribe` replaces any
/// previous one and `unsubscribe` must release it before returning.
pub trait SensorSource: Send {
    fn name(&self) -> &str;

    /// Whether the platform exposes a motion sensor at all
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(&mut self) -> StepResult<Receiver<MotionEvent>>;

    fn unsubscribe(&mut self);
}

/// Source fed by the host: each platform motion callback is forwarded
/// through a `MotionSender`.
pub struct ChannelSource {
    slot: Arc<Mutex<Option<Sender<MotionEvent>>>>,
    available: bool,
}

/// Host-side handle of a `ChannelSource`
#[derive(Clone)]
pub struct MotionSender {
    slot: Arc<Mutex<Option<Sender<MotionEvent>>>>,
}

impl ChannelSource {
    pub fn new() -> (Self, MotionSender) {
        Self::with_availability(true)
    }

    /// Source for a platform without a motion API
    pub fn unavailable() -> (Self, MotionSender) {
        Self::with_availability(false)
    }

    fn with_availability(available: bool) -> (Self, MotionSender) {
        let slot = Arc::new(Mutex::new(None));
        let sender = MotionSender { slot: slot.clone() };
        (Self { slot, available }, sender)
    }
}

impl SensorSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn subscribe(&mut self) -> StepResult<Receiver<MotionEvent>> {
        if !self.available {
            return Err(StepCounterError::SensorUnavailable(
                "Device motion not supported".to_string(),
            ));
        }
        let (tx, rx) = channel(SUBSCRIPTION_CAPACITY);
        let mut slot = self.slot.lock().map_err(|_| {
            StepCounterError::Internal("Failed to acquire subscription lock".to_string())
        })?;
        *slot = Some(tx);
        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl MotionSender {
    /// Deliver one event. Returns false when nobody is subscribed or the
    /// subscription buffer is full (the event is dropped).
    pub fn push(&self, event: MotionEvent) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            return false;
        };
        let Some(tx) = slot.as_ref() else {
            return false;
        };

        match tx.try_send(event) {
            Ok(_) => true,
            Err(TrySendError::Closed(_)) => {
                *slot = None;
                false
            }
            Err(TrySendError::Full(_)) => {
                trace!("Subscription full, dropping event at {}ms", event.timestamp_ms);
                false
            }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot
            .lock()
            .ok()
            .map(|s| s.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Synthetic walker: resting gravity with a heel-strike spike every step
#[derive(Debug, Clone)]
pub struct WalkProfile {
    pub sample_interval: Duration,
    pub cadence_hz: f64,
    /// Added to gravity on the heel-strike sample
    pub impact: f64,
    /// Every n-th sample drops its y axis; 0 disables
    pub dropout_every: u64,
}

impl Default for WalkProfile {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(16), // ~60Hz
            cadence_hz: 1.8,
            impact: 18.0,
            dropout_every: 0,
        }
    }
}

impl WalkProfile {
    /// Sampling period, never below 1ms
    pub fn tick_period(&self) -> Duration {
        self.sample_interval.max(Duration::from_millis(1))
    }

    /// Sample at `elapsed_ms` for sample number `seq`
    pub fn sample_at(&self, seq: u64, elapsed_ms: u64) -> AccelerationSample {
        if self.dropout_every > 0 && seq > 0 && seq % self.dropout_every == 0 {
            return AccelerationSample {
                x: Some(0.0),
                y: None,
                z: Some(GRAVITY),
            };
        }

        let step_period_ms = if self.cadence_hz > 0.0 {
            ((1000.0 / self.cadence_hz) as u64).max(1)
        } else {
            u64::MAX
        };
        let interval_ms = self.tick_period().as_millis() as u64;
        let phase = elapsed_ms % step_period_ms;
        let sway = ((elapsed_ms as f64) / 1000.0 * std::f64::consts::TAU * self.cadence_hz).sin();

        let z = if elapsed_ms >= step_period_ms && phase < interval_ms {
            GRAVITY + self.impact
        } else {
            GRAVITY + sway * 0.4
        };

        AccelerationSample::new(sway * 0.5, sway * 0.3, z)
    }
}

/// Simulated motion sensor driven by a tokio interval
pub struct SimulatedWalk {
    profile: WalkProfile,
    producer: Option<JoinHandle<()>>,
}

impl SimulatedWalk {
    pub fn new(profile: WalkProfile) -> Self {
        Self {
            profile,
            producer: None,
        }
    }
}

impl SensorSource for SimulatedWalk {
    fn name(&self) -> &str {
        "simulated"
    }

    fn subscribe(&mut self) -> StepResult<Receiver<MotionEvent>> {
        self.unsubscribe();
        let (tx, rx) = channel(SUBSCRIPTION_CAPACITY);
        self.producer = Some(tokio::spawn(walk_loop(tx, self.profile.clone())));
        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

impl Drop for SimulatedWalk {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn walk_loop(tx: Sender<MotionEvent>, profile: WalkProfile) {
    let mut ticker = interval(profile.tick_period());
    let start = Instant::now();
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let event = MotionEvent::new(elapsed_ms, profile.sample_at(sample_count, elapsed_ms));

        match tx.try_send(event) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    debug!("[accel] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[accel] Channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}

/// Replays a recorded motion log into a subscription
pub struct ReplaySource {
    events: Arc<Vec<MotionEvent>>,
    realtime: bool,
    producer: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(log: MotionLog) -> Self {
        Self {
            events: Arc::new(log.events),
            realtime: false,
            producer: None,
        }
    }

    /// Sleep between events according to their timestamps
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl SensorSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn subscribe(&mut self) -> StepResult<Receiver<MotionEvent>> {
        self.unsubscribe();
        let (tx, rx) = channel(SUBSCRIPTION_CAPACITY);
        self.producer = Some(tokio::spawn(replay_loop(
            tx,
            self.events.clone(),
            self.realtime,
        )));
        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn replay_loop(tx: Sender<MotionEvent>, events: Arc<Vec<MotionEvent>>, realtime: bool) {
    let mut prev_ms: Option<u64> = None;

    for event in events.iter() {
        if realtime {
            if let Some(prev) = prev_ms {
                sleep(Duration::from_millis(event.timestamp_ms.saturating_sub(prev))).await;
            }
            prev_ms = Some(event.timestamp_ms);
        }
        if tx.send(*event).await.is_err() {
            debug!("[replay] Subscription closed");
            return;
        }
    }

    info!("[replay] Delivered {} events", events.len());
}
