use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};

use step_counter::{
    ChannelSource, DetectorConfig, DisplaySink, FanOut, FixedPrompt, LogDisplay, MotionLog,
    PermissionGate, PromptResponse, ReplaySource, SensorSource, SessionController, SimulatedWalk,
    StatusFileSink, WalkProfile,
};

#[derive(Parser, Debug)]
#[command(name = "step_counter")]
#[command(about = "Count steps from an accelerometer stream", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Permission model: implicit, granted, denied or default
    #[arg(long, default_value = "implicit")]
    permission: String,

    /// Pretend the platform has no motion sensor
    #[arg(long)]
    unavailable: bool,

    /// Replay a recorded motion log (.json or .json.gz) instead of simulating a walk
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Detector config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Magnitude delta that counts as a step (m/s²)
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum spacing between steps in milliseconds
    #[arg(long)]
    refractory_ms: Option<u64>,

    /// Simulated walking cadence in steps per second
    #[arg(long, default_value = "1.8")]
    cadence_hz: f64,

    /// Write live status JSON here on every change
    #[arg(long)]
    status_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let base = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };
    let config = base.with_overrides(args.threshold, args.refractory_ms)?;

    let gate = match args.permission.as_str() {
        "implicit" => PermissionGate::implicit(),
        other => {
            let response: PromptResponse = other.parse()?;
            PermissionGate::explicit(Arc::new(FixedPrompt::new(response)))
        }
    };

    let mut display = FanOut::new().with(Arc::new(LogDisplay));
    if let Some(path) = &args.status_file {
        display = display.with(Arc::new(StatusFileSink::new(path)));
    }
    let display: Arc<dyn DisplaySink> = Arc::new(display);

    info!("Step Counter starting");
    info!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);
    info!("  Threshold: {:.2} m/s²", config.step_threshold);
    info!("  Refractory: {} ms", config.refractory_ms);
    info!("  Permission: {}", args.permission);

    if args.unavailable {
        let (source, _sender) = ChannelSource::unavailable();
        return run(SessionController::new(gate, source, config, display)?, &args).await;
    }

    match &args.replay {
        Some(path) => {
            let log = MotionLog::load(path)?;
            info!("  Replay: {} ({} events)", path.display(), log.events.len());
            let source = ReplaySource::new(log).realtime(true);
            run(SessionController::new(gate, source, config, display)?, &args).await
        }
        None => {
            if args.cadence_hz <= 0.0 {
                bail!("--cadence-hz must be positive");
            }
            let source = SimulatedWalk::new(WalkProfile {
                cadence_hz: args.cadence_hz,
                ..WalkProfile::default()
            });
            run(SessionController::new(gate, source, config, display)?, &args).await
        }
    }
}

async fn run<S: SensorSource>(mut session: SessionController<S>, args: &Args) -> Result<()> {
    if let Err(e) = session.start().await {
        warn!("Motion sensors need permission to work: {}", e);
        print_summary(&session)?;
        return Ok(());
    }

    let start = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping...");
                break;
            }
            _ = sleep(Duration::from_millis(250)) => {}
        }

        if args.duration > 0 && start.elapsed().as_secs() >= args.duration {
            info!("Duration reached, stopping...");
            break;
        }
        if args.replay.is_some() && !session.is_streaming() {
            info!("Replay finished, stopping...");
            break;
        }
    }

    session.stop()?;
    print_summary(&session)
}

fn print_summary<S: SensorSource>(session: &SessionController<S>) -> Result<()> {
    let snapshot = session.snapshot()?;
    println!("\n=== Session Summary ===");
    println!(
        "Session: {}",
        snapshot.session_id.as_deref().unwrap_or("never started")
    );
    println!("Supported: {}", snapshot.supported);
    println!("Samples: {} ({} discarded)", snapshot.samples_seen, snapshot.discarded_samples);
    println!(
        "{} {}",
        snapshot.step_count,
        if snapshot.step_count == 1 { "Step" } else { "Steps" }
    );
    Ok(())
}
