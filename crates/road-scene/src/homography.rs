//! Bird's-eye-view homography
//!
//! Maps the calibration quadrilateral in the camera image onto a top-down
//! raster whose pixels are a fixed fraction of a meter. The near edge of the
//! quadrilateral lands on the bottom row of the raster, the far edge on the
//! top row.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationPoints;
use crate::config::AnalyzerConfig;
use crate::AnalysisError;

/// Smallest triangle area (px²) accepted between any three calibration points
const MIN_TRIANGLE_AREA: f64 = 1e-3;

/// Smallest accepted |det(H)|
const MIN_DETERMINANT: f64 = 1e-12;

/// Position on the ground plane relative to the BEV raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPoint {
    /// Distance from the left edge of the monitored lanes (meters)
    pub lateral_m: f64,
    /// Distance ahead of the near edge of the monitored region (meters)
    pub longitudinal_m: f64,
}

/// Destination raster derived from the configured lane geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevGeometry {
    /// Raster width (pixels)
    pub width: u32,
    /// Raster height (pixels)
    pub height: u32,
    /// Pixels per meter
    pub scale: f64,
    /// Destination corners: near-left, near-right, far-right, far-left
    pub corners: [[f64; 2]; 4],
}

impl BevGeometry {
    /// Size the raster from lane width, lane count, look-ahead and scale
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let width = (config.roi_width_m() * config.scale).floor() as u32;
        let height = (config.ahead_m * config.scale).floor() as u32;
        let near = height as f64 - 1.0;
        let far = near - config.ahead_m * config.scale;
        let right = width as f64 - 1.0;

        Self {
            width,
            height,
            scale: config.scale,
            corners: [[0.0, near], [right, near], [right, far], [0.0, far]],
        }
    }

    /// Convert a BEV raster coordinate to ground meters
    pub fn to_ground(&self, bev_x: f64, bev_y: f64) -> GroundPoint {
        GroundPoint {
            lateral_m: bev_x / self.scale,
            longitudinal_m: (self.height as f64 - 1.0 - bev_y) / self.scale,
        }
    }

    /// Convert ground meters back to a BEV raster coordinate
    pub fn from_ground(&self, ground: GroundPoint) -> (f64, f64) {
        (
            ground.lateral_m * self.scale,
            self.height as f64 - 1.0 - ground.longitudinal_m * self.scale,
        )
    }
}

/// Forward (image → BEV) and inverse (BEV → image) perspective transforms
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Solve the perspective transform taking `src[i]` to `dst[i]`.
    ///
    /// Fails with `DegenerateCalibration` when three of the source points are
    /// collinear (duplicates included) or the resulting matrix is singular.
    pub fn from_correspondences(
        src: &[[f64; 2]; 4],
        dst: &[[f64; 2]; 4],
    ) -> Result<Self, AnalysisError> {
        check_quad(src)?;
        check_quad(dst)?;

        // h22 is fixed to 1; two equations per correspondence for the rest.
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
            let (x, y, u, v) = (s[0], s[1], d[0], d[1]);
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -x * u;
            a[(r, 7)] = -y * u;
            b[r] = u;

            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -x * v;
            a[(r + 1, 7)] = -y * v;
            b[r + 1] = v;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            AnalysisError::DegenerateCalibration("perspective system is singular".into())
        })?;

        let forward = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        Self::from_matrix(forward)
    }

    /// Wrap a forward matrix, computing its inverse
    pub fn from_matrix(forward: Matrix3<f64>) -> Result<Self, AnalysisError> {
        if !forward.iter().all(|v| v.is_finite()) || forward.determinant().abs() < MIN_DETERMINANT {
            return Err(AnalysisError::DegenerateCalibration(
                "forward transform is singular".into(),
            ));
        }
        let inverse = forward.try_inverse().ok_or_else(|| {
            AnalysisError::DegenerateCalibration("forward transform is not invertible".into())
        })?;
        Ok(Self { forward, inverse })
    }

    /// Build the image → BEV transform for a calibration and raster
    pub fn for_calibration(
        points: &CalibrationPoints,
        bev: &BevGeometry,
    ) -> Result<Self, AnalysisError> {
        Self::from_correspondences(points.as_array(), &bev.corners)
    }

    /// Image → BEV matrix
    pub fn forward(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// BEV → image matrix
    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    /// Map an image pixel into the BEV raster.
    ///
    /// Points on the horizon line map to non-finite coordinates.
    pub fn pixel_to_bev(&self, x: f64, y: f64) -> (f64, f64) {
        apply(&self.forward, x, y)
    }

    /// Map a BEV raster coordinate back into the image
    pub fn bev_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        apply(&self.inverse, x, y)
    }
}

fn apply(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = m * Vector3::new(x, y, 1.0);
    (p.x / p.z, p.y / p.z)
}

fn check_quad(pts: &[[f64; 2]; 4]) -> Result<(), AnalysisError> {
    if pts.iter().flatten().any(|v| !v.is_finite()) {
        return Err(AnalysisError::DegenerateCalibration(
            "non-finite calibration point".into(),
        ));
    }
    for (i, j, k) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let area = ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])).abs() / 2.0;
        if area < MIN_TRIANGLE_AREA {
            return Err(AnalysisError::DegenerateCalibration(format!(
                "points {}, {} and {} are collinear",
                i, j, k
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn road_quad() -> [[f64; 2]; 4] {
        [
            [230.4, 691.2],
            [1036.8, 691.2],
            [844.8, 453.6],
            [422.4, 453.6],
        ]
    }

    #[test]
    fn test_bev_geometry_from_defaults() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        assert_eq!((bev.width, bev.height), (72, 350));
        assert_eq!(bev.corners[0], [0.0, 349.0]);
        assert_eq!(bev.corners[1], [71.0, 349.0]);
        assert_eq!(bev.corners[2], [71.0, -1.0]);
        assert_eq!(bev.corners[3], [0.0, -1.0]);
    }

    #[test]
    fn test_maps_corners_exactly() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        let h = Homography::from_correspondences(&road_quad(), &bev.corners).unwrap();
        for (s, d) in road_quad().iter().zip(bev.corners.iter()) {
            let (u, v) = h.pixel_to_bev(s[0], s[1]);
            assert!((u - d[0]).abs() < 1e-6, "u={} expected {}", u, d[0]);
            assert!((v - d[1]).abs() < 1e-6, "v={} expected {}", v, d[1]);
        }
    }

    #[test]
    fn test_near_edge_is_zero_meters() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        let h = Homography::from_correspondences(&road_quad(), &bev.corners).unwrap();
        let (u, v) = h.pixel_to_bev(633.6, 691.2);
        let ground = bev.to_ground(u, v);
        assert!(ground.longitudinal_m.abs() < 1e-6);
        assert!((ground.lateral_m - 3.55).abs() < 1e-6);
    }

    #[test]
    fn test_ground_conversion_round_trip() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        let ground = GroundPoint {
            lateral_m: 2.5,
            longitudinal_m: 17.0,
        };
        let (x, y) = bev.from_ground(ground);
        let back = bev.to_ground(x, y);
        assert!((back.lateral_m - 2.5).abs() < 1e-9);
        assert!((back.longitudinal_m - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_collinear_points() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        let collinear = [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [0.0, 50.0]];
        assert!(matches!(
            Homography::from_correspondences(&collinear, &bev.corners),
            Err(AnalysisError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_points() {
        let bev = BevGeometry::from_config(&AnalyzerConfig::default());
        let mut quad = road_quad();
        quad[3] = quad[2];
        assert!(matches!(
            Homography::from_correspondences(&quad, &bev.corners),
            Err(AnalysisError::DegenerateCalibration(_))
        ));
    }

    #[test]
    fn test_rejects_singular_matrix() {
        let singular = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(Homography::from_matrix(singular).is_err());
    }

    proptest! {
        #[test]
        fn prop_inverse_round_trips_corners(
            near_y in 500.0f64..700.0,
            far_y in 300.0f64..480.0,
            near_left in 50.0f64..300.0,
            near_right in 900.0f64..1200.0,
            far_left in 400.0f64..600.0,
            far_right in 650.0f64..850.0,
        ) {
            let src = [
                [near_left, near_y],
                [near_right, near_y],
                [far_right, far_y],
                [far_left, far_y],
            ];
            let bev = BevGeometry::from_config(&AnalyzerConfig::default());
            let h = Homography::from_correspondences(&src, &bev.corners).unwrap();

            let product = h.forward() * h.inverse();
            prop_assert!((product - Matrix3::identity()).abs().max() < 1e-6);

            for (s, d) in src.iter().zip(bev.corners.iter()) {
                let (x, y) = h.bev_to_pixel(d[0], d[1]);
                prop_assert!((x - s[0]).abs() < 1e-3);
                prop_assert!((y - s[1]).abs() < 1e-3);
            }
        }
    }
}
