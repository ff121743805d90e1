//! Detector output and semantic buckets

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AnalysisError;

/// Object class relevant to road scene analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Vehicle,
    TrafficLight,
    StopSign,
}

/// Axis-aligned box in source-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Ground contact point: bottom-center of the box
    pub fn ground_anchor(&self) -> (f64, f64) {
        (0.5 * (self.x1 as f64 + self.x2 as f64), self.y2 as f64)
    }
}

/// One detection from the external object detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector class id
    pub class_id: u32,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Box in source-frame pixels
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }

    /// Reject non-finite values, out-of-range confidence and inverted boxes
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let b = &self.bbox;
        if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) {
            return Err(AnalysisError::MalformedDetection(format!(
                "non-finite box {:?}",
                b
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AnalysisError::MalformedDetection(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if b.x1 >= b.x2 || b.y1 >= b.y2 {
            return Err(AnalysisError::MalformedDetection(format!(
                "inverted box ({}, {}, {}, {})",
                b.x1, b.y1, b.x2, b.y2
            )));
        }
        Ok(())
    }
}

/// Mapping from detector class ids to semantic buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    pub vehicle: HashSet<u32>,
    pub traffic_light: HashSet<u32>,
    pub stop_sign: HashSet<u32>,
}

impl ClassMap {
    /// COCO ids: car, motorcycle, bus, truck / traffic light / stop sign
    pub fn coco() -> Self {
        Self {
            vehicle: [2, 3, 5, 7].into_iter().collect(),
            traffic_light: [9].into_iter().collect(),
            stop_sign: [11].into_iter().collect(),
        }
    }

    /// Bucket for a class id; `None` for unmapped ids
    pub fn classify(&self, class_id: u32) -> Option<ObjectClass> {
        if self.vehicle.contains(&class_id) {
            Some(ObjectClass::Vehicle)
        } else if self.traffic_light.contains(&class_id) {
            Some(ObjectClass::TrafficLight)
        } else if self.stop_sign.contains(&class_id) {
            Some(ObjectClass::StopSign)
        } else {
            None
        }
    }

    /// Buckets must be disjoint
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let overlaps = self.vehicle.intersection(&self.traffic_light).next().is_some()
            || self.vehicle.intersection(&self.stop_sign).next().is_some()
            || self.traffic_light.intersection(&self.stop_sign).next().is_some();
        if overlaps {
            return Err(AnalysisError::InvalidConfig(
                "class map buckets overlap".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::coco()
    }
}

/// Detections of one frame split by bucket
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    pub vehicles: Vec<Detection>,
    pub traffic_lights: Vec<Detection>,
    pub stop_signs: Vec<Detection>,
    /// Detections dropped as malformed
    pub skipped: usize,
}

impl Buckets {
    /// Validate, confidence-gate and bucket a frame's detections.
    ///
    /// Malformed detections are skipped individually; unmapped classes and
    /// low-confidence detections are ignored.
    pub fn partition(detections: &[Detection], classes: &ClassMap, min_confidence: f32) -> Self {
        let mut buckets = Self::default();
        for det in detections {
            if let Err(e) = det.validate() {
                debug!("Skipping detection: {}", e);
                buckets.skipped += 1;
                continue;
            }
            if det.confidence < min_confidence {
                continue;
            }
            match classes.classify(det.class_id) {
                Some(ObjectClass::Vehicle) => buckets.vehicles.push(*det),
                Some(ObjectClass::TrafficLight) => buckets.traffic_lights.push(*det),
                Some(ObjectClass::StopSign) => buckets.stop_signs.push(*det),
                None => {}
            }
        }
        buckets
    }
}
