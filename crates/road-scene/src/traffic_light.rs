//! Traffic light color classification
//!
//! Heuristic only: the crop is cut into top/middle/bottom bands, red is
//! scored on the top band, yellow on the middle and green on the bottom. It
//! assumes the conventional vertical lamp order and does not check which
//! lamp is actually lit.

use serde::{Deserialize, Serialize};
use video_frame::VideoFrame;

/// Crops smaller than this in either dimension are not classified
const MIN_CROP_PX: u32 = 9;

/// Winning band must match strictly more than this fraction of its pixels
const MIN_SCORE: f64 = 0.05;

/// Saturation and value floor shared by every color range (8-bit scale)
const SV_FLOOR: u8 = 80;

/// Classified lamp color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
    Unknown,
}

impl LightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LightColor::Red => "red",
            LightColor::Yellow => "yellow",
            LightColor::Green => "green",
            LightColor::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LightColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hue ranges (0-180 scale, inclusive) for a color
struct HueRange(&'static [(u8, u8)]);

const RED: HueRange = HueRange(&[(0, 10), (170, 180)]);
const YELLOW: HueRange = HueRange(&[(18, 38)]);
const GREEN: HueRange = HueRange(&[(40, 90)]);

impl HueRange {
    fn matches(&self, [h, s, v]: [u8; 3]) -> bool {
        s >= SV_FLOOR && v >= SV_FLOOR && self.0.iter().any(|&(lo, hi)| (lo..=hi).contains(&h))
    }
}

/// Convert an RGB pixel to 8-bit HSV (H in 0-179, S and V in 0-255)
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    // Hue 360° rounds to 180 and wraps back to 0
    [((h / 2.0).round() as u8) % 180, s.round() as u8, max as u8]
}

/// Fraction of pixels in rows `[top, bottom)` matching the range
fn band_score(crop: &VideoFrame, top: u32, bottom: u32, range: &HueRange) -> f64 {
    let total = (bottom - top) as usize * crop.width as usize;
    if total == 0 {
        return 0.0;
    }
    let start = top as usize * crop.width as usize * 3;
    let end = bottom as usize * crop.width as usize * 3;
    let Some(rows) = crop.data.get(start..end) else {
        return 0.0;
    };
    let hits = rows
        .chunks_exact(3)
        .filter(|p| range.matches(rgb_to_hsv([p[0], p[1], p[2]])))
        .count();
    hits as f64 / total as f64
}

/// Classify the lamp color of a cropped traffic light
pub fn classify(crop: &VideoFrame) -> LightColor {
    if crop.width < MIN_CROP_PX || crop.height < MIN_CROP_PX || crop.validate().is_err() {
        return LightColor::Unknown;
    }

    let seg = crop.height / 3;
    let scores = [
        (LightColor::Red, band_score(crop, 0, seg, &RED)),
        (LightColor::Yellow, band_score(crop, seg, 2 * seg, &YELLOW)),
        (LightColor::Green, band_score(crop, 2 * seg, crop.height, &GREEN)),
    ];

    // First maximum wins ties, in red, yellow, green order.
    let (color, score) = scores
        .iter()
        .copied()
        .fold((LightColor::Unknown, f64::MIN), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        });

    if score > MIN_SCORE {
        color
    } else {
        LightColor::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DARK: [u8; 3] = [20, 20, 20];

    /// Housing-colored crop with the given bands painted
    fn light(width: u32, height: u32, bands: [Option<[u8; 3]>; 3]) -> VideoFrame {
        let mut frame = VideoFrame::filled(width, height, DARK);
        let seg = height / 3;
        let ranges = [(0, seg), (seg, 2 * seg), (2 * seg, height)];
        for (band, (top, bottom)) in bands.iter().zip(ranges) {
            if let Some(rgb) = band {
                for y in top..bottom {
                    for x in 0..width {
                        frame.set_pixel(x, y, *rgb);
                    }
                }
            }
        }
        frame
    }

    #[test]
    fn test_hsv_conversion() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 255, 0]), [30, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
        // Magenta-ish red wraps near 180
        assert_eq!(rgb_to_hsv([255, 0, 20])[0], 178);
        // Just below 360° rounds up and wraps to 0
        assert_eq!(rgb_to_hsv([255, 0, 1])[0], 0);
    }

    #[test]
    fn test_hue_stays_below_180() {
        for r in (0..=255u16).step_by(5) {
            for b in (0..=255u16).step_by(5) {
                assert!(rgb_to_hsv([r as u8, 0, b as u8])[0] < 180);
            }
        }
    }

    #[test]
    fn test_red_on_top() {
        let crop = light(12, 30, [Some([255, 0, 0]), None, None]);
        assert_eq!(classify(&crop), LightColor::Red);
    }

    #[test]
    fn test_yellow_in_middle() {
        let crop = light(12, 30, [None, Some([255, 210, 0]), None]);
        assert_eq!(classify(&crop), LightColor::Yellow);
    }

    #[test]
    fn test_green_at_bottom() {
        let crop = light(12, 30, [None, None, Some([0, 255, 60])]);
        assert_eq!(classify(&crop), LightColor::Green);
    }

    #[test]
    fn test_red_wins_tie_with_green() {
        let crop = light(12, 30, [Some([255, 0, 0]), None, Some([0, 255, 0])]);
        assert_eq!(classify(&crop), LightColor::Red);
    }

    #[test]
    fn test_color_in_wrong_band_is_ignored() {
        // Green lamp painted on top scores nothing: only red is checked there.
        let crop = light(12, 30, [Some([0, 255, 0]), None, None]);
        assert_eq!(classify(&crop), LightColor::Unknown);
    }

    #[test]
    fn test_too_small() {
        let crop = light(8, 30, [Some([255, 0, 0]), None, None]);
        assert_eq!(classify(&crop), LightColor::Unknown);
        let crop = light(30, 8, [Some([255, 0, 0]), None, None]);
        assert_eq!(classify(&crop), LightColor::Unknown);
    }

    #[test]
    fn test_weak_signal_is_unknown() {
        // One red pixel out of 120 in the top band: below 5%.
        let mut crop = light(12, 30, [None, None, None]);
        crop.set_pixel(3, 3, [255, 0, 0]);
        assert_eq!(classify(&crop), LightColor::Unknown);
    }

    #[test]
    fn test_dim_lamp_below_value_floor() {
        let crop = light(12, 30, [Some([70, 0, 0]), None, None]);
        assert_eq!(classify(&crop), LightColor::Unknown);
    }

    #[test]
    fn test_serialized_lowercase() {
        assert_eq!(serde_json::to_string(&LightColor::Yellow).unwrap(), "\"yellow\"");
    }
}
