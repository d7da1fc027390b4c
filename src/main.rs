//! Offline replay: feed a JSON-lines keypoint recording through a coaching
//! session and print every change of the live state.
//!
//! Each input line is `{"timestamp_ms": f64, "keypoints": [{x, y, z, visibility}; 33]}`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use form_coach::config::Config;
use form_coach::diagnosis::View;
use form_coach::exercise::ExerciseKind;
use form_coach::pose::{Keypoint, Pose};
use form_coach::session::{CoachSession, LiveState, PoseFrame};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    timestamp_ms: f64,
    keypoints: Vec<Keypoint>,
}

struct Args {
    recording: String,
    mode: ExerciseKind,
    config_path: String,
    diagnose: Option<View>,
}

fn usage() -> &'static str {
    "usage: form-coach <recording.jsonl> [--mode squat|pushup|jumping-jack|plank] [--config PATH] [--diagnose front|side]"
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut recording = None;
    let mut mode = ExerciseKind::Squat;
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut diagnose = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args.next().context("--mode needs a value")?;
                mode = value.parse().map_err(anyhow::Error::msg)?;
            }
            "--config" => config_path = args.next().context("--config needs a value")?,
            "--diagnose" => {
                diagnose = Some(match args.next().as_deref() {
                    Some("front") => View::Front,
                    Some("side") => View::Side,
                    _ => bail!("--diagnose takes front or side"),
                });
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            _ if recording.is_none() => recording = Some(arg),
            _ => bail!("unexpected argument: {}\n{}", arg, usage()),
        }
    }

    Ok(Args {
        recording: recording.context(usage())?,
        mode,
        config_path,
        diagnose,
    })
}

/// Whether the change is worth a line of output
fn changed(prev: Option<&LiveState>, next: &LiveState) -> bool {
    match prev {
        None => true,
        Some(p) => {
            p.rep_count != next.rep_count
                || p.phase != next.phase
                || p.feedback != next.feedback
                || p.safety_risk != next.safety_risk
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = parse_args()?;
    let config = Config::load_or_default(&args.config_path);
    let mut session = CoachSession::new(&config, args.mode)?;

    let file = File::open(&args.recording)
        .with_context(|| format!("Failed to open recording {}", args.recording))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut last: Option<LiveState> = None;
    let mut frames = 0usize;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let recorded: RecordedFrame = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("line {}: {}", line_no + 1, e);
                continue;
            }
        };
        let Some(pose) = Pose::from_slice(&recorded.keypoints) else {
            warn!("line {}: expected 33 keypoints, got {}", line_no + 1, recorded.keypoints.len());
            continue;
        };

        let live = session.process_frame(&PoseFrame {
            timestamp_ms: recorded.timestamp_ms,
            pose,
            jpeg: None,
        });
        frames += 1;
        if changed(last.as_ref(), live) {
            writeln!(out, "{}", serde_json::to_string(live)?)?;
            last = Some(live.clone());
        }
    }

    if let Some(view) = args.diagnose {
        if let Some(report) = session.diagnose(view) {
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
        }
    }

    let live = session.live_state();
    eprintln!(
        "{} frames, {}: {} reps, last score {}, best hold {:.1}s",
        frames, live.mode, live.rep_count, live.last_score, live.best_hold_secs
    );
    session.stop();
    Ok(())
}
