//! Subcommand implementations

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use alerting::{AlertConfig, AlertManager};
use anyhow::{Context, Result};
use road_scene::{load_font, AnalyzerConfig, CalibrationPoints, RoadSceneAnalyzer};
use serde_json::json;
use tracing::info;
use video_frame::VideoFrame;

use crate::{frame_time, parse_detections, AnalyzeArgs, CalibrateArgs, ManifestEntry, ReplayArgs};

/// Build an analyzer from the optional config, calibration and font paths.
///
/// An explicit config file wins over the config stored with the calibration.
fn build_analyzer(
    config: Option<&Path>,
    calibration: Option<&Path>,
    font: Option<&Path>,
) -> Result<RoadSceneAnalyzer> {
    let analyzer_config = AnalyzerConfig::load(config).context("Failed to load analyzer config")?;
    let mut analyzer = RoadSceneAnalyzer::new(analyzer_config.clone())?;

    if let Some(path) = calibration {
        analyzer
            .load_calibration(path)
            .with_context(|| format!("Failed to load calibration {}", path.display()))?;
        if config.is_some() {
            analyzer.set_config(analyzer_config)?;
        }
    }

    if let Some(path) = font {
        let font = load_font(path).with_context(|| format!("Failed to load font {}", path.display()))?;
        analyzer = analyzer.with_font(font);
    }

    Ok(analyzer)
}

/// Analyze one frame and print its result
pub fn analyze(args: AnalyzeArgs) -> Result<()> {
    let mut analyzer = build_analyzer(
        args.config.as_deref(),
        args.calibration.as_deref(),
        args.font.as_deref(),
    )?;

    let frame = VideoFrame::load(&args.frame, 0)
        .with_context(|| format!("Failed to read frame {}", args.frame.display()))?;
    let text = fs::read_to_string(&args.detections)
        .with_context(|| format!("Failed to read detections {}", args.detections.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", args.detections.display()))?;
    let (detections, skipped) = parse_detections(&value)?;

    let (annotated, mut result) = analyzer.update(&frame, &detections)?;
    result.skipped_detections += skipped;

    if let Some(output) = &args.output {
        annotated
            .frame
            .save(output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!("Annotated frame written to {}", output.display());
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Validate a calibration for a frame size and write it
pub fn calibrate(args: CalibrateArgs) -> Result<()> {
    let points = match &args.points {
        Some(text) => CalibrationPoints::parse(text)?,
        None => CalibrationPoints::default_for_frame(args.width, args.height),
    };

    let config = AnalyzerConfig::load(args.config.as_deref()).context("Failed to load analyzer config")?;
    let mut analyzer = RoadSceneAnalyzer::new(config)?;
    analyzer.set_calibration(points, Some((args.width, args.height)))?;
    analyzer
        .save_calibration(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("{}", args.output.display());
    Ok(())
}

/// Run every manifest frame through one analyzer, in order
pub fn replay(args: ReplayArgs) -> Result<()> {
    let mut analyzer = build_analyzer(
        args.config.as_deref(),
        args.calibration.as_deref(),
        args.font.as_deref(),
    )?;
    let mut alerts = AlertManager::new(AlertConfig {
        cooldown_seconds: args.cooldown_seconds,
        ..Default::default()
    });

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let base = args.manifest.parent().map(Path::to_path_buf).unwrap_or_default();
    let manifest = File::open(&args.manifest)
        .with_context(|| format!("Failed to open manifest {}", args.manifest.display()))?;

    let start = Instant::now();
    let mut sequence: u32 = 0;
    for (line_no, line) in BufReader::new(manifest).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ManifestEntry = serde_json::from_str(&line)
            .with_context(|| format!("Invalid manifest line {}", line_no + 1))?;
        let frame_path: PathBuf = base.join(&entry.frame);

        let frame = VideoFrame::load(&frame_path, sequence)
            .with_context(|| format!("Failed to read frame {}", frame_path.display()))?;
        let (detections, skipped) = parse_detections(&entry.detections)
            .with_context(|| format!("Invalid detections on manifest line {}", line_no + 1))?;

        let (annotated, mut result) = analyzer.update(&frame, &detections)?;
        result.skipped_detections += skipped;

        // Cooldowns run on recording time, not on how fast the replay goes.
        let at = start + frame_time(entry.timestamp_s, sequence, args.fps)?;
        let fired = alerts.process_at(&result, at);

        if let Some(dir) = &args.output_dir {
            let out = dir.join(format!("frame_{:06}.png", sequence));
            annotated
                .frame
                .save(&out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
        }

        println!(
            "{}",
            json!({
                "sequence": sequence,
                "frame": frame_path,
                "result": result,
                "alerts": fired,
            })
        );
        sequence += 1;
    }

    info!("Replayed {} frames", sequence);
    Ok(())
}
