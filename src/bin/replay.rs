use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use step_counter::{DetectorConfig, MotionLog, StepDetector, StepEvent};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a motion log (.json or .json.gz)
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of motion logs to batch replay (processes *.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Detector config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Magnitude delta that counts as a step (m/s²)
    #[arg(long)]
    threshold: Option<f64>,

    /// Minimum spacing between steps in milliseconds
    #[arg(long)]
    refractory_ms: Option<u64>,

    /// Print every accepted step
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Emit the summary as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    log: String,
    samples: usize,
    discarded: usize,
    steps: u64,
    duration_ms: u64,
    cadence_hz: f64,
}

fn replay_log(path: &Path, config: DetectorConfig, verbose: bool) -> anyhow::Result<ReplaySummary> {
    let log = MotionLog::load(path)?;
    let mut detector = StepDetector::new(config);
    let mut discarded = 0usize;
    let mut steps: Vec<StepEvent> = Vec::new();

    for event in &log.events {
        let sample = &event.acceleration_including_gravity;
        if sample.full().is_none() {
            discarded += 1;
            continue;
        }
        if let Some(step) = detector.process_sample(sample, event.timestamp_ms) {
            if verbose {
                println!(
                    "step {:>5} @ {:>8}ms  |a|={:>6.2}  delta={:>6.2}",
                    step.step_count, step.timestamp_ms, step.magnitude, step.delta
                );
            }
            steps.push(step);
        }
    }

    let duration_ms = match (log.events.first(), log.events.last()) {
        (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
        _ => 0,
    };
    let cadence_hz = if duration_ms > 0 {
        steps.len() as f64 / (duration_ms as f64 / 1000.0)
    } else {
        0.0
    };

    Ok(ReplaySummary {
        log: path.display().to_string(),
        samples: log.events.len(),
        discarded,
        steps: detector.step_count(),
        duration_ms,
        cadence_hz,
    })
}

fn collect_logs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.ends_with(".json") || name.ends_with(".json.gz")
        })
        .collect();
    logs.sort();
    Ok(logs)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let base = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)?,
        None => DetectorConfig::default(),
    };
    let config = base.with_overrides(args.threshold, args.refractory_ms)?;

    let logs = match (&args.log, &args.log_dir) {
        (Some(log), _) => vec![log.clone()],
        (None, Some(dir)) => collect_logs(dir)?,
        (None, None) => anyhow::bail!("pass --log <file> or --log-dir <dir>"),
    };
    if logs.is_empty() {
        anyhow::bail!("no motion logs found");
    }

    let mut total_steps = 0u64;
    for path in &logs {
        let summary = replay_log(path, config, args.verbose)?;
        total_steps += summary.steps;
        if args.json {
            println!("{}", serde_json::to_string(&summary)?);
        } else {
            println!(
                "{}: {} samples ({} discarded), {} steps over {:.1}s ({:.2} steps/s)",
                summary.log,
                summary.samples,
                summary.discarded,
                summary.steps,
                summary.duration_ms as f64 / 1000.0,
                summary.cadence_hz
            );
        }
    }

    if logs.len() > 1 && !args.json {
        println!("\n=== Total: {} steps across {} logs ===", total_steps, logs.len());
    }

    Ok(())
}
