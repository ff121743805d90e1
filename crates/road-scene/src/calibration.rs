//! Calibration quadrilateral and its on-disk document

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AnalyzerConfig;
use crate::AnalysisError;

/// Default trapezoid as fractions of the frame: (x, y) per corner
const DEFAULT_TRAPEZOID: [[f64; 2]; 4] = [
    [0.18, 0.96],
    [0.81, 0.96],
    [0.66, 0.63],
    [0.33, 0.63],
];

/// Four image points bounding the monitored road region.
///
/// Order: near-left, near-right, far-right, far-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationPoints([[f64; 2]; 4]);

impl CalibrationPoints {
    /// Create from corner coordinates
    pub fn new(points: [[f64; 2]; 4]) -> Self {
        Self(points)
    }

    /// Symmetric trapezoid over the lower middle of a forward-facing frame
    pub fn default_for_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self(DEFAULT_TRAPEZOID.map(|[fx, fy]| [fx * w, fy * h]))
    }

    /// Parse `"x,y;x,y;x,y;x,y"`
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let pairs: Vec<&str> = text.split(';').map(str::trim).collect();
        if pairs.len() != 4 {
            return Err(AnalysisError::InvalidCalibration(format!(
                "expected 4 points, got {}",
                pairs.len()
            )));
        }

        let mut points = [[0.0; 2]; 4];
        for (slot, pair) in points.iter_mut().zip(pairs) {
            let (x, y) = pair.split_once(',').ok_or_else(|| {
                AnalysisError::InvalidCalibration(format!("malformed point '{}'", pair))
            })?;
            let parse = |v: &str| {
                v.trim().parse::<f64>().map_err(|e| {
                    AnalysisError::InvalidCalibration(format!("malformed coordinate '{}': {}", v, e))
                })
            };
            *slot = [parse(x)?, parse(y)?];
        }
        Ok(Self(points))
    }

    pub fn as_array(&self) -> &[[f64; 2]; 4] {
        &self.0
    }

    pub fn near_left(&self) -> [f64; 2] {
        self.0[0]
    }

    pub fn near_right(&self) -> [f64; 2] {
        self.0[1]
    }

    pub fn far_right(&self) -> [f64; 2] {
        self.0[2]
    }

    pub fn far_left(&self) -> [f64; 2] {
        self.0[3]
    }

    /// Check every point lies within `[0, width] x [0, height]`
    pub fn validate_within(&self, width: u32, height: u32) -> Result<(), AnalysisError> {
        for (i, [x, y]) in self.0.iter().enumerate() {
            let inside = (0.0..=width as f64).contains(x) && (0.0..=height as f64).contains(y);
            if !inside {
                return Err(AnalysisError::InvalidCalibration(format!(
                    "point {} ({}, {}) outside {}x{} frame",
                    i, x, y, width, height
                )));
            }
        }
        Ok(())
    }
}

/// Persisted calibration: the points plus the config they were made with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub points: CalibrationPoints,
    #[serde(default)]
    pub config: AnalyzerConfig,
}

impl CalibrationFile {
    /// Read and validate a calibration document
    pub fn read(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&text)?;
        file.config.validate()?;
        info!("Loaded calibration from {}", path.display());
        Ok(file)
    }

    /// Write as pretty-printed JSON
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!("Saved calibration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("road-scene-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_default_for_720p() {
        let points = CalibrationPoints::default_for_frame(1280, 720);
        let expected = [
            [230.4, 691.2],
            [1036.8, 691.2],
            [844.8, 453.6],
            [422.4, 453.6],
        ];
        for (p, e) in points.as_array().iter().zip(expected.iter()) {
            assert!((p[0] - e[0]).abs() < 1e-9);
            assert!((p[1] - e[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bounds_check() {
        let points = CalibrationPoints::default_for_frame(1280, 720);
        assert!(points.validate_within(1280, 720).is_ok());
        assert!(matches!(
            points.validate_within(640, 480),
            Err(AnalysisError::InvalidCalibration(_))
        ));

        let negative = CalibrationPoints::new([[-1.0, 10.0], [10.0, 10.0], [10.0, 0.0], [0.0, 0.0]]);
        assert!(negative.validate_within(100, 100).is_err());
    }

    #[test]
    fn test_parse() {
        let points = CalibrationPoints::parse("10,700; 1200,700; 800,400; 450.5,400").unwrap();
        assert_eq!(points.near_left(), [10.0, 700.0]);
        assert_eq!(points.far_left(), [450.5, 400.0]);

        assert!(CalibrationPoints::parse("1,2;3,4;5,6").is_err());
        assert!(CalibrationPoints::parse("1,2;3,4;5,6;7").is_err());
        assert!(CalibrationPoints::parse("1,2;3,4;5,6;7,x").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = temp_path("round-trip");
        let file = CalibrationFile {
            points: CalibrationPoints::new([[1.1, 2.2], [3.3, 4.4], [5.5, 6.6], [7.7, 8.8]]),
            config: AnalyzerConfig {
                ahead_m: 42.0,
                ..Default::default()
            },
        };
        file.write(&path).unwrap();
        let loaded = CalibrationFile::read(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, file);
    }

    #[test]
    fn test_tolerates_additive_fields() {
        let path = temp_path("additive");
        fs::write(
            &path,
            r#"{
                "points": [[0, 10], [10, 10], [8, 0], [2, 0]],
                "config": {"scale": 20.0, "camera_height_m": 1.4},
                "version": 3
            }"#,
        )
        .unwrap();
        let loaded = CalibrationFile::read(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.points.far_right(), [8.0, 0.0]);
        assert_eq!(loaded.config.scale, 20.0);
        assert_eq!(loaded.config.ahead_m, 35.0);
    }
}
