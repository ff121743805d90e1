//! Overlay planning and rasterization
//!
//! The analyzer first builds an [`OverlayPlan`] (boxes, labels, banners and
//! the calibration outline) and then rasterizes it onto a copy of the frame.
//! Labels need a font; without one they stay in the plan only, so a UI layer
//! can render them itself.

use ab_glyph::{FontArc, PxScale};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::Serialize;
use video_frame::{FrameError, VideoFrame};

use crate::analysis::AnalysisResult;
use crate::calibration::CalibrationPoints;
use crate::detection::BoundingBox;
use crate::traffic_light::LightColor;

/// RGB color
pub type Color = [u8; 3];

pub const GREEN: Color = [0, 255, 0];
pub const RED: Color = [255, 0, 0];
pub const YELLOW: Color = [255, 255, 0];
pub const GREY: Color = [200, 200, 200];
pub const WHITE: Color = [255, 255, 255];
pub const STOP_BOX: Color = [255, 165, 0];
pub const STOP_TEXT: Color = [255, 128, 0];
pub const ROI_OUTLINE: Color = [0, 200, 255];

const BOX_LABEL_PX: f32 = 18.0;
const STOP_LABEL_PX: f32 = 21.0;
const BANNER_PX: f32 = 30.0;
const ALERT_PX: f32 = 36.0;

/// Box color for a classified traffic light
pub fn light_color(color: LightColor) -> Color {
    match color {
        LightColor::Red => RED,
        LightColor::Yellow => YELLOW,
        LightColor::Green => GREEN,
        LightColor::Unknown => GREY,
    }
}

/// Single drawing operation in frame pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Rect {
        bbox: BoundingBox,
        color: Color,
        thickness: u8,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Color,
        thickness: u8,
    },
    /// `anchor` is the left end of the text baseline
    Label {
        anchor: (f32, f32),
        text: String,
        font_px: f32,
        color: Color,
    },
}

/// Ordered list of drawing operations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayPlan {
    pub ops: Vec<DrawOp>,
}

impl OverlayPlan {
    pub fn rect(&mut self, bbox: BoundingBox, color: Color, thickness: u8) {
        self.ops.push(DrawOp::Rect {
            bbox,
            color,
            thickness,
        });
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, thickness: u8) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            color,
            thickness,
        });
    }

    pub fn label(&mut self, anchor: (f32, f32), text: impl Into<String>, font_px: f32, color: Color) {
        self.ops.push(DrawOp::Label {
            anchor,
            text: text.into(),
            font_px,
            color,
        });
    }

    /// Label texts in drawing order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Whether a label with exactly this text is planned
    pub fn has_label(&self, text: &str) -> bool {
        self.labels().any(|l| l == text)
    }

    /// Plan the full scene overlay for a frame's analysis
    pub fn for_scene(result: &AnalysisResult, points: &CalibrationPoints) -> Self {
        let mut plan = Self::default();

        for v in &result.vehicles {
            plan.rect(v.bbox, GREEN, 2);
            plan.label(
                (v.bbox.x1, v.bbox.y1 - 6.0),
                format!("{:.1} m", v.ground.longitudinal_m),
                BOX_LABEL_PX,
                GREEN,
            );
        }

        if let Some(nearest) = result.nearest_m {
            plan.label((30.0, 50.0), format!("Nearest: {:.1} m", nearest), BANNER_PX, WHITE);
        }
        if result.alarm_active {
            plan.label((30.0, 100.0), "ALERT!", ALERT_PX, RED);
        }

        for tl in &result.traffic_lights {
            let color = light_color(tl.color);
            plan.rect(tl.bbox, color, 2);
            plan.label(
                (tl.bbox.x1, tl.bbox.y1 - 6.0),
                format!("TL:{}", tl.color),
                BOX_LABEL_PX,
                color,
            );
        }
        if result.red_light_alert {
            plan.label((30.0, 140.0), "RED LIGHT AHEAD", BANNER_PX, RED);
        }

        for bbox in &result.stop_signs {
            plan.rect(*bbox, STOP_BOX, 2);
            plan.label((bbox.x1, bbox.y1 - 6.0), "STOP", STOP_LABEL_PX, STOP_TEXT);
        }
        if result.stop_sign_alert {
            plan.label((30.0, 180.0), "STOP SIGN", BANNER_PX, STOP_TEXT);
        }

        let corners = points.as_array();
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            plan.line(
                (a[0] as f32, a[1] as f32),
                (b[0] as f32, b[1] as f32),
                ROI_OUTLINE,
                2,
            );
        }

        plan
    }

    /// Rasterize onto a copy of `frame`; labels are skipped without a font
    pub fn render(&self, frame: &VideoFrame, font: Option<&FontArc>) -> Result<VideoFrame, FrameError> {
        let mut img = frame.to_rgb_image()?;
        let (width, height) = img.dimensions();

        for op in &self.ops {
            match op {
                DrawOp::Rect {
                    bbox,
                    color,
                    thickness,
                } => {
                    let x = clamp_to_canvas(bbox.x1, width) as i32;
                    let y = clamp_to_canvas(bbox.y1, height) as i32;
                    let w = (clamp_to_canvas(bbox.x2, width) as i32 - x).max(1);
                    let h = (clamp_to_canvas(bbox.y2, height) as i32 - y).max(1);
                    for t in 0..(*thickness).max(1) as i32 {
                        let rect = Rect::at(x - t, y - t).of_size((w + 2 * t) as u32, (h + 2 * t) as u32);
                        draw_hollow_rect_mut(&mut img, rect, image::Rgb(*color));
                    }
                }
                DrawOp::Line {
                    from,
                    to,
                    color,
                    thickness,
                } => {
                    let Some((from, to)) = clip_segment(*from, *to, width, height) else {
                        continue;
                    };
                    let t = (*thickness).max(1) as i32;
                    for o in (-(t / 2))..(t - t / 2) {
                        let o = o as f32;
                        draw_line_segment_mut(&mut img, (from.0 + o, from.1), (to.0 + o, to.1), image::Rgb(*color));
                        draw_line_segment_mut(&mut img, (from.0, from.1 + o), (to.0, to.1 + o), image::Rgb(*color));
                    }
                }
                DrawOp::Label {
                    anchor,
                    text,
                    font_px,
                    color,
                } => {
                    if let Some(font) = font {
                        let left = anchor.0.clamp(0.0, width as f32) as i32;
                        let top = (anchor.1 - font_px).clamp(0.0, height as f32) as i32;
                        draw_text_mut(
                            &mut img,
                            image::Rgb(*color),
                            left,
                            top,
                            PxScale::from(*font_px),
                            font,
                            text,
                        );
                    }
                }
            }
        }

        Ok(VideoFrame::from_rgb_image(img, frame.timestamp_ns, frame.sequence))
    }
}

/// Slack kept around the canvas when clamping geometry, wider than any stroke offset
const CANVAS_MARGIN: f32 = 300.0;

/// Clamp a coordinate to the canvas extent plus margin so integer pixel math cannot overflow
fn clamp_to_canvas(v: f32, extent: u32) -> f32 {
    v.clamp(-CANVAS_MARGIN, extent as f32 + CANVAS_MARGIN)
}

/// Clip a segment to the canvas plus margin (Liang-Barsky).
///
/// Returns `None` when the segment misses the canvas or is not finite.
fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    width: u32,
    height: u32,
) -> Option<((f32, f32), (f32, f32))> {
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
    if ![x0, y0, dx, dy].iter().all(|v| v.is_finite()) {
        return None;
    }
    let margin = CANVAS_MARGIN as f64;
    let (x_max, y_max) = (width as f64 + margin, height as f64 + margin);

    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, x0 + margin),
        (dx, x_max - x0),
        (-dy, y0 + margin),
        (dy, y_max - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }

    Some((
        ((x0 + t0 * dx) as f32, (y0 + t0 * dy) as f32),
        ((x0 + t1 * dx) as f32, (y0 + t1 * dy) as f32),
    ))
}
