//! Road Scene Analysis
//!
//! Turns an external detector's output into driving-relevant state:
//! - Following distance via a bird's-eye-view homography
//! - Distance smoothing and debounced too-close alarm
//! - Traffic light color classification
//! - Stop sign proximity
//! - Annotated overlay of the frame
//!
//! Object detection itself is out of scope: callers pass each frame with
//! the detections they obtained for it.

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod homography;
pub mod overlay;
pub mod smoothing;
pub mod traffic_light;

pub use analysis::{AnalysisResult, AnnotatedFrame, TrafficLightObservation, VehicleObservation};
pub use calibration::{CalibrationFile, CalibrationPoints};
pub use config::AnalyzerConfig;
pub use detection::{BoundingBox, ClassMap, Detection, ObjectClass};
pub use homography::{BevGeometry, GroundPoint, Homography};
pub use overlay::{DrawOp, OverlayPlan};
pub use traffic_light::LightColor;

use std::path::Path;

use ab_glyph::FontArc;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_frame::{FrameError, VideoFrame};

use crate::detection::Buckets;
use crate::smoothing::{AlarmDebouncer, DistanceSmoother};

/// Road scene analysis error types
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Degenerate calibration: {0}")]
    DegenerateCalibration(String),

    #[error("Analyzer is not calibrated")]
    NotCalibrated,

    #[error("Malformed detection: {0}")]
    MalformedDetection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),

    #[error("Font loading failed: {0}")]
    Font(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

/// Load a TrueType/OpenType font for label rendering
pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, AnalysisError> {
    let bytes = std::fs::read(path.as_ref())?;
    FontArc::try_from_vec(bytes).map_err(|e| AnalysisError::Font(e.to_string()))
}

/// Calibration points with the transform derived from them
#[derive(Debug, Clone)]
pub struct Calibration {
    points: CalibrationPoints,
    bev: BevGeometry,
    homography: Homography,
}

impl Calibration {
    /// Derive the BEV raster and homography for `points` under `config`
    pub fn new(points: CalibrationPoints, config: &AnalyzerConfig) -> Result<Self, AnalysisError> {
        let bev = BevGeometry::from_config(config);
        let homography = Homography::for_calibration(&points, &bev)?;
        Ok(Self {
            points,
            bev,
            homography,
        })
    }

    pub fn points(&self) -> &CalibrationPoints {
        &self.points
    }

    pub fn bev(&self) -> &BevGeometry {
        &self.bev
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    /// Project an image pixel onto the ground plane
    pub fn pixel_to_ground(&self, px: f64, py: f64) -> GroundPoint {
        let (bx, by) = self.homography.pixel_to_bev(px, py);
        self.bev.to_ground(bx, by)
    }

    /// Image pixel for a ground position
    pub fn ground_to_pixel(&self, ground: GroundPoint) -> (f64, f64) {
        let (bx, by) = self.bev.from_ground(ground);
        self.homography.bev_to_pixel(bx, by)
    }
}

/// Calibration lifecycle of an analyzer
#[derive(Debug, Clone)]
pub enum CalibrationState {
    /// No calibration yet; the first frame triggers the default trapezoid
    Uncalibrated,
    Calibrated(Calibration),
}

/// Road scene analyzer for one camera stream.
///
/// Holds the smoothing and alarm state across frames, so frames of a stream
/// must go through the same instance, in order.
pub struct RoadSceneAnalyzer {
    config: AnalyzerConfig,
    classes: ClassMap,
    state: CalibrationState,
    smoother: DistanceSmoother,
    alarm: AlarmDebouncer,
    font: Option<FontArc>,
}

impl RoadSceneAnalyzer {
    /// Create an uncalibrated analyzer
    pub fn new(config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        info!("Creating road scene analyzer with config: {:?}", config);
        Ok(Self {
            alarm: AlarmDebouncer::new(config.alarm_distance_m, config.alarm_hold_frames),
            smoother: DistanceSmoother::default(),
            classes: ClassMap::coco(),
            state: CalibrationState::Uncalibrated,
            font: None,
            config,
        })
    }

    /// Replace the detector class mapping
    pub fn with_class_map(mut self, classes: ClassMap) -> Result<Self, AnalysisError> {
        classes.validate()?;
        self.classes = classes;
        Ok(self)
    }

    /// Rasterize overlay labels with this font
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        match &self.state {
            CalibrationState::Calibrated(c) => Some(c),
            CalibrationState::Uncalibrated => None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration().is_some()
    }

    /// Smoothed nearest distance, sticky across frames without vehicles
    pub fn smoothed_distance(&self) -> Option<f64> {
        self.smoother.value()
    }

    /// Set the calibration quadrilateral.
    ///
    /// With `frame_size`, every point must lie inside the frame.
    pub fn set_calibration(
        &mut self,
        points: CalibrationPoints,
        frame_size: Option<(u32, u32)>,
    ) -> Result<(), AnalysisError> {
        if let Some((width, height)) = frame_size {
            points.validate_within(width, height)?;
        }
        let calibration = Calibration::new(points, &self.config)?;
        info!("Calibration set: {:?}", points.as_array());
        self.state = CalibrationState::Calibrated(calibration);
        Ok(())
    }

    /// Replace the configuration, rebuilding the homography if calibrated.
    ///
    /// Smoothed distance and alarm count carry over.
    pub fn set_config(&mut self, config: AnalyzerConfig) -> Result<(), AnalysisError> {
        config.validate()?;
        if let CalibrationState::Calibrated(current) = &self.state {
            let rebuilt = Calibration::new(current.points, &config)?;
            self.state = CalibrationState::Calibrated(rebuilt);
        }
        self.alarm
            .reconfigure(config.alarm_distance_m, config.alarm_hold_frames);
        info!("Analyzer config replaced: {:?}", config);
        self.config = config;
        Ok(())
    }

    /// Project an image pixel to ground meters
    pub fn pixel_to_ground_meters(&self, px: f64, py: f64) -> Result<GroundPoint, AnalysisError> {
        self.calibration()
            .map(|c| c.pixel_to_ground(px, py))
            .ok_or(AnalysisError::NotCalibrated)
    }

    /// Write the calibration points and current config
    pub fn save_calibration(&self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let calibration = self.calibration().ok_or(AnalysisError::NotCalibrated)?;
        CalibrationFile {
            points: calibration.points,
            config: self.config.clone(),
        }
        .write(path)
    }

    /// Restore calibration points and config from disk
    pub fn load_calibration(&mut self, path: impl AsRef<Path>) -> Result<(), AnalysisError> {
        let file = CalibrationFile::read(path)?;
        let calibration = Calibration::new(file.points, &file.config)?;
        self.alarm
            .reconfigure(file.config.alarm_distance_m, file.config.alarm_hold_frames);
        self.config = file.config;
        self.state = CalibrationState::Calibrated(calibration);
        Ok(())
    }

    fn ensure_calibrated(&mut self, frame: &VideoFrame) -> Result<(), AnalysisError> {
        if let CalibrationState::Uncalibrated = self.state {
            let points = CalibrationPoints::default_for_frame(frame.width, frame.height);
            info!(
                "Auto-calibrating from {}x{} frame: {:?}",
                frame.width,
                frame.height,
                points.as_array()
            );
            let calibration = Calibration::new(points, &self.config)?;
            self.state = CalibrationState::Calibrated(calibration);
        }
        Ok(())
    }

    /// Analyze one frame with its detections.
    ///
    /// Returns an annotated copy of the frame and the frame's result. The
    /// first call on an uncalibrated analyzer calibrates from the frame size.
    pub fn update(
        &mut self,
        frame: &VideoFrame,
        detections: &[Detection],
    ) -> Result<(AnnotatedFrame, AnalysisResult), AnalysisError> {
        // Empty frames go on to calibration, which reports them as degenerate.
        match frame.validate() {
            Ok(()) | Err(FrameError::Empty { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.ensure_calibrated(frame)?;
        frame.validate()?;

        let calibration = match &self.state {
            CalibrationState::Calibrated(c) => c,
            CalibrationState::Uncalibrated => return Err(AnalysisError::NotCalibrated),
        };
        let config = &self.config;

        let buckets = Buckets::partition(detections, &self.classes, config.confidence_threshold);

        // Following distance over vehicles inside the monitored window
        let lateral_window = -config.lane_width_m..=config.roi_width_m() + config.lane_width_m;
        let vehicles: Vec<VehicleObservation> = buckets
            .vehicles
            .iter()
            .filter_map(|det| {
                let (px, py) = det.bbox.ground_anchor();
                let ground = calibration.pixel_to_ground(px, py);
                let ahead = (0.0..=config.ahead_m).contains(&ground.longitudinal_m);
                if ahead && lateral_window.contains(&ground.lateral_m) {
                    Some(VehicleObservation {
                        bbox: det.bbox,
                        ground,
                    })
                } else {
                    debug!(
                        "Vehicle outside window: lateral {:.2} m, longitudinal {:.2} m",
                        ground.lateral_m, ground.longitudinal_m
                    );
                    None
                }
            })
            .collect();

        let raw_nearest = vehicles
            .iter()
            .map(|v| v.ground.longitudinal_m)
            .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))));
        let nearest = self.smoother.update(raw_nearest);

        let was_active = self.alarm.is_active();
        let alarm_active = self.alarm.update(nearest);
        if alarm_active && !was_active {
            warn!(
                "Following distance alarm: {:.1} m for {} frames",
                nearest.unwrap_or_default(),
                self.alarm.count()
            );
        }

        let traffic_lights: Vec<TrafficLightObservation> = buckets
            .traffic_lights
            .iter()
            .map(|det| {
                let b = det.bbox;
                let color = frame
                    .crop_box(b.x1, b.y1, b.x2, b.y2)
                    .map(|crop| traffic_light::classify(&crop))
                    .unwrap_or(LightColor::Unknown);
                TrafficLightObservation { bbox: b, color }
            })
            .collect();
        let red_light = traffic_lights.iter().any(|tl| tl.color == LightColor::Red);
        let stop_sign = !buckets.stop_signs.is_empty();

        let closer_than = |limit: f64| nearest.is_some_and(|d| d < limit);

        let result = AnalysisResult {
            nearest_m: nearest,
            raw_nearest_m: raw_nearest,
            red_light,
            stop_sign,
            vehicle_count: buckets.vehicles.len(),
            vehicles,
            traffic_lights,
            stop_signs: buckets.stop_signs.iter().map(|d| d.bbox).collect(),
            alarm_active,
            alarm_frames: self.alarm.count(),
            red_light_alert: red_light && closer_than(config.red_light_alert_distance_m),
            stop_sign_alert: stop_sign && closer_than(config.stop_sign_alert_distance_m),
            skipped_detections: buckets.skipped,
        };

        let overlay = OverlayPlan::for_scene(&result, &calibration.points);
        let annotated = overlay.render(frame, self.font.as_ref())?;

        Ok((
            AnnotatedFrame {
                frame: annotated,
                overlay,
            },
            result,
        ))
    }
}
