//! Analyzer configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AnalysisError;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ROAD_SCENE";

/// Road scene analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Physical lane width (meters)
    pub lane_width_m: f64,

    /// Number of lanes covered by the calibration quadrilateral
    pub num_lanes_in_roi: f64,

    /// Longitudinal extent of the monitored region (meters)
    pub ahead_m: f64,

    /// BEV raster resolution (pixels per meter)
    pub scale: f64,

    /// Detection confidence threshold
    pub confidence_threshold: f32,

    /// NMS IoU threshold, forwarded to the external detector
    pub iou_threshold: f32,

    /// Following distance below which the alarm starts accumulating (meters)
    pub alarm_distance_m: f64,

    /// Consecutive frames below the alarm distance before the alarm is active
    pub alarm_hold_frames: u32,

    /// Red light banner distance (meters)
    pub red_light_alert_distance_m: f64,

    /// Stop sign banner distance (meters)
    pub stop_sign_alert_distance_m: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            lane_width_m: 3.6,
            num_lanes_in_roi: 2.0,
            ahead_m: 35.0,
            scale: 10.0,
            confidence_threshold: 0.30,
            iou_threshold: 0.45,
            alarm_distance_m: 12.0,
            alarm_hold_frames: 15,
            red_light_alert_distance_m: 25.0,
            stop_sign_alert_distance_m: 20.0,
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ROAD_SCENE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AnalysisError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("Loading analyzer config from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!("Analyzer config: {:?}", config);
        Ok(config)
    }

    /// Real-world width of the monitored lanes (meters)
    pub fn roi_width_m(&self) -> f64 {
        self.lane_width_m * self.num_lanes_in_roi
    }

    /// Check the geometry and threshold invariants
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let positive = [
            ("lane_width_m", self.lane_width_m),
            ("num_lanes_in_roi", self.num_lanes_in_roi),
            ("ahead_m", self.ahead_m),
            ("scale", self.scale),
            ("alarm_distance_m", self.alarm_distance_m),
            ("red_light_alert_distance_m", self.red_light_alert_distance_m),
            ("stop_sign_alert_distance_m", self.stop_sign_alert_distance_m),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }

        for (field, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    field, value
                )));
            }
        }

        if self.alarm_hold_frames == 0 {
            return Err(AnalysisError::InvalidConfig(
                "alarm_hold_frames must be at least 1".into(),
            ));
        }

        // The destination rectangle needs two distinct rows and columns.
        if self.roi_width_m() * self.scale < 2.0 || self.ahead_m * self.scale < 2.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "BEV raster too small: {:.1}x{:.1} px",
                self.roi_width_m() * self.scale,
                self.ahead_m * self.scale
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.roi_width_m() - 7.2).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_positive_geometry() {
        let config = AnalyzerConfig {
            scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AnalysisError::InvalidConfig(_))));

        let config = AnalyzerConfig {
            ahead_m: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let config = AnalyzerConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AnalyzerConfig {
            alarm_hold_frames: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"ahead_m": 50.0, "future_field": true}"#).unwrap();
        assert_eq!(config.ahead_m, 50.0);
        assert_eq!(config.lane_width_m, 3.6);
        assert_eq!(config.alarm_hold_frames, 15);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("road-scene-config-{}.toml", std::process::id()));
        std::fs::write(&path, "ahead_m = 40.0\nalarm_hold_frames = 5\n").unwrap();

        let config = AnalyzerConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.ahead_m, 40.0);
        assert_eq!(config.alarm_hold_frames, 5);
        assert_eq!(config.scale, 10.0);
    }
}
