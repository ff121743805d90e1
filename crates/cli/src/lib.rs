//! Road Scene CLI
//!
//! Runs the road scene analyzer over still frames with detections recorded
//! by an external detector.
//!
//! # Usage
//!
//! ```bash
//! # Analyze one frame
//! road-scene analyze --frame frame.png --detections dets.json --output annotated.png
//!
//! # Write a calibration file for a 1280x720 camera
//! road-scene calibrate --width 1280 --height 720 --output calibration.json
//!
//! # Replay a recorded sequence
//! road-scene replay --manifest drive.jsonl --calibration calibration.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use road_scene::Detection;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

pub mod commands;

/// Road scene analysis command line interface
#[derive(Parser, Debug)]
#[command(name = "road-scene")]
#[command(author, version, about = "Following distance, traffic light and stop sign analysis")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a single frame and print the result as JSON
    Analyze(AnalyzeArgs),

    /// Write a calibration document
    Calibrate(CalibrateArgs),

    /// Analyze a recorded frame sequence and report alerts
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Frame image
    #[arg(long)]
    pub frame: PathBuf,

    /// JSON array of detections for the frame
    #[arg(long)]
    pub detections: PathBuf,

    /// Calibration document; auto-calibrates from the frame when absent
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Analyzer config file, overrides the calibration document's config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Font used to draw overlay labels
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Where to write the annotated frame
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Frame width (pixels)
    #[arg(long)]
    pub width: u32,

    /// Frame height (pixels)
    #[arg(long)]
    pub height: u32,

    /// Points as "x,y;x,y;x,y;x,y" (near-left, near-right, far-right, far-left)
    #[arg(long)]
    pub points: Option<String>,

    /// Analyzer config file stored alongside the points
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Calibration document to write
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON lines manifest: {"frame": path, "detections": [...], "timestamp_s": t} per line
    #[arg(long)]
    pub manifest: PathBuf,

    /// Calibration document; auto-calibrates from the first frame when absent
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Analyzer config file, overrides the calibration document's config
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Font used to draw overlay labels
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Directory for annotated frames
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Minimum seconds between two alerts of the same kind
    #[arg(long, default_value_t = 3.0)]
    pub cooldown_seconds: f64,

    /// Frame rate of the recording, for lines without `timestamp_s`
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,
}

/// Initialize logging to stderr
pub fn init_logging(verbose: u8, json: bool) -> Result<()> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// One line of a replay manifest
#[derive(Debug, Deserialize)]
pub struct ManifestEntry {
    /// Frame image, relative to the manifest's directory
    pub frame: PathBuf,
    #[serde(default)]
    pub detections: Value,
    /// Capture time relative to the start of the recording (seconds)
    #[serde(default)]
    pub timestamp_s: Option<f64>,
}

/// Recording time of a manifest frame: its own timestamp, else `sequence / fps`
pub fn frame_time(timestamp_s: Option<f64>, sequence: u32, fps: f64) -> Result<Duration> {
    let seconds = match timestamp_s {
        Some(t) => t,
        None => {
            if !(fps.is_finite() && fps > 0.0) {
                bail!("fps must be positive, got {}", fps);
            }
            sequence as f64 / fps
        }
    };
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid frame timestamp {} s", seconds))
}

/// Decode a detection array, skipping entries that do not deserialize.
///
/// Returns the detections and the number of skipped entries. `null` is an
/// empty frame.
pub fn parse_detections(value: &Value) -> Result<(Vec<Detection>, usize)> {
    let items = match value {
        Value::Null => return Ok((Vec::new(), 0)),
        Value::Array(items) => items,
        other => bail!("detections must be a JSON array, got {}", other),
    };

    let mut detections = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (i, item) in items.iter().enumerate() {
        match Detection::deserialize(item) {
            Ok(det) => detections.push(det),
            Err(e) => {
                debug!("Skipping detection {}: {}", i, e);
                skipped += 1;
            }
        }
    }
    Ok((detections, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_detections() {
        let value = json!([
            {"class_id": 2, "confidence": 0.9, "box": {"x1": 10.0, "y1": 20.0, "x2": 50.0, "y2": 80.0}},
            {"class_id": 9, "confidence": 0.7},
            {"class_id": 11, "confidence": 0.8, "box": {"x1": 1.0, "y1": 2.0, "x2": 3.0, "y2": 4.0}, "label": "stop sign"}
        ]);

        let (detections, skipped) = parse_detections(&value).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 2);
        assert_eq!(detections[0].bbox.y2, 80.0);
        assert_eq!(detections[1].class_id, 11);
    }

    #[test]
    fn test_parse_detections_null_and_object() {
        assert_eq!(parse_detections(&Value::Null).unwrap().0.len(), 0);
        assert!(parse_detections(&json!({"class_id": 2})).is_err());
    }

    #[test]
    fn test_manifest_entry_without_detections() {
        let entry: ManifestEntry = serde_json::from_str(r#"{"frame": "f0001.png"}"#).unwrap();
        assert_eq!(entry.frame, PathBuf::from("f0001.png"));
        assert!(entry.detections.is_null());
    }

    #[test]
    fn test_frame_time() {
        assert_eq!(frame_time(None, 60, 30.0).unwrap(), Duration::from_secs(2));
        assert_eq!(frame_time(Some(1.25), 60, 30.0).unwrap(), Duration::from_millis(1250));
        assert!(frame_time(None, 1, 0.0).is_err());
        assert!(frame_time(Some(-1.0), 0, 30.0).is_err());
        assert!(frame_time(Some(f64::NAN), 0, 30.0).is_err());
    }

    #[test]
    fn test_manifest_entry_timestamp() {
        let entry: ManifestEntry =
            serde_json::from_str(r#"{"frame": "f.png", "detections": [], "timestamp_s": 4.5}"#).unwrap();
        assert_eq!(entry.timestamp_s, Some(4.5));
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "road-scene",
            "-vv",
            "replay",
            "--manifest",
            "drive.jsonl",
            "--cooldown-seconds",
            "1.5",
            "--fps",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.manifest, PathBuf::from("drive.jsonl"));
                assert_eq!(args.cooldown_seconds, 1.5);
                assert_eq!(args.fps, 10.0);
                assert!(args.calibration.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_frame_size_for_calibrate() {
        assert!(Cli::try_parse_from(["road-scene", "calibrate", "--output", "c.json"]).is_err());
    }
}
