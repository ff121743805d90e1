//! Per-frame analysis results

use serde::{Deserialize, Serialize};
use video_frame::VideoFrame;

use crate::detection::BoundingBox;
use crate::homography::GroundPoint;
use crate::overlay::OverlayPlan;
use crate::traffic_light::LightColor;

/// Vehicle inside the monitored window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleObservation {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Ground position of the box's bottom-center
    pub ground: GroundPoint,
}

/// Traffic light with its classified color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightObservation {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub color: LightColor,
}

/// Result of analyzing one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Smoothed nearest following distance (meters)
    pub nearest_m: Option<f64>,

    /// Unsmoothed nearest distance in this frame (meters)
    pub raw_nearest_m: Option<f64>,

    /// At least one traffic light classified red
    pub red_light: bool,

    /// At least one stop sign detected
    pub stop_sign: bool,

    /// Vehicle detections in the frame, inside the window or not
    pub vehicle_count: usize,

    /// Vehicles inside the monitored window
    pub vehicles: Vec<VehicleObservation>,

    /// Classified traffic lights
    pub traffic_lights: Vec<TrafficLightObservation>,

    /// Stop sign boxes
    pub stop_signs: Vec<BoundingBox>,

    /// Following-distance alarm debounced over consecutive frames
    pub alarm_active: bool,

    /// Consecutive frames below the alarm distance
    pub alarm_frames: u32,

    /// Red light while closer than the red light alert distance
    pub red_light_alert: bool,

    /// Stop sign while closer than the stop sign alert distance
    pub stop_sign_alert: bool,

    /// Detections dropped as malformed
    pub skipped_detections: usize,
}

impl AnalysisResult {
    /// Check if any alert condition is active
    pub fn has_alerts(&self) -> bool {
        self.alarm_active || self.red_light_alert || self.stop_sign_alert
    }
}

/// Annotated copy of the input frame and the overlay drawn on it
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: VideoFrame,
    pub overlay: OverlayPlan,
}
