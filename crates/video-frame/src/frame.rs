//! Video frame type and pixel operations

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::FrameError;

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 0, 0)
    }

    /// Expected buffer length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Check that the buffer matches the dimensions and is non-empty
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        if self.data.len() != self.expected_len() {
            return Err(FrameError::BufferSize {
                expected: self.expected_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(idx..idx + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Set pixel at (x, y); out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        if let Some(px) = self.data.get_mut(idx..idx + 3) {
            px.copy_from_slice(&rgb);
        }
    }

    /// Iterate over RGB pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if x.checked_add(w)? > self.width || y.checked_add(h)? > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity(w as usize * h as usize * 3);
        for row in y..(y + h) {
            let start = (row as usize * self.width as usize + x as usize) * 3;
            let end = start + w as usize * 3;
            cropped.extend_from_slice(self.data.get(start..end)?);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Crop the region covered by a `(x1, y1, x2, y2)` box.
    ///
    /// Coordinates are truncated toward zero and clamped to the frame, so boxes
    /// that hang over the border yield the visible part. Returns `None` when
    /// nothing of the box is inside the frame.
    pub fn crop_box(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<VideoFrame> {
        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as u32).min(max)
            }
        };
        let (left, right) = (clamp(x1, self.width), clamp(x2, self.width));
        let (top, bottom) = (clamp(y1, self.height), clamp(y2, self.height));
        if right <= left || bottom <= top {
            debug!("Box ({}, {}, {}, {}) lies outside the frame", x1, y1, x2, y2);
            return None;
        }
        self.crop(left, top, right - left, bottom - top)
    }

    /// Convert to an `image` buffer (copies the pixel data)
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        self.validate()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::BufferSize {
                expected: self.expected_len(),
                actual: self.data.len(),
            },
        )
    }

    /// Wrap an `image` buffer
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Load a still image from disk (any format supported by `image`)
    pub fn load(path: impl AsRef<Path>, sequence: u32) -> Result<Self, FrameError> {
        let img = image::open(path.as_ref())?.to_rgb8();
        let frame = Self::from_rgb_image(img, 0, sequence);
        frame.validate()?;
        Ok(frame)
    }

    /// Save the frame to disk; the format follows the file extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FrameError> {
        self.to_rgb_image()?.save(path.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut frame = VideoFrame::filled(width, height, [0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(x, y, [x as u8, y as u8, 7]);
            }
        }
        frame
    }

    #[test]
    fn test_validate() {
        assert!(VideoFrame::filled(4, 3, [1, 2, 3]).validate().is_ok());

        let short = VideoFrame::new(vec![0; 10], 4, 3, 0, 0);
        assert!(matches!(
            short.validate(),
            Err(FrameError::BufferSize { expected: 36, actual: 10 })
        ));

        let empty = VideoFrame::new(vec![], 0, 3, 0, 0);
        assert!(matches!(empty.validate(), Err(FrameError::Empty { .. })));
    }

    #[test]
    fn test_crop() {
        let frame = gradient(10, 8);
        let crop = frame.crop(2, 3, 4, 2).unwrap();
        assert_eq!((crop.width, crop.height), (4, 2));
        assert_eq!(crop.get_pixel(0, 0), Some([2, 3, 7]));
        assert_eq!(crop.get_pixel(3, 1), Some([5, 4, 7]));
        assert!(frame.crop(8, 0, 4, 2).is_none());
    }

    #[test]
    fn test_crop_box_clamps_to_frame() {
        let frame = gradient(10, 8);
        let crop = frame.crop_box(-5.0, 6.5, 3.9, 20.0).unwrap();
        assert_eq!((crop.width, crop.height), (3, 2));
        assert_eq!(crop.get_pixel(0, 0), Some([0, 6, 7]));

        assert!(frame.crop_box(12.0, 0.0, 15.0, 4.0).is_none());
        assert!(frame.crop_box(4.0, 4.0, 4.5, 6.0).is_none());
    }

    #[test]
    fn test_rgb_image_conversion() {
        let frame = gradient(6, 5);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(4, 3).0, [4, 3, 7]);

        let back = VideoFrame::from_rgb_image(img, 42, 9);
        assert_eq!(back.data, frame.data);
        assert_eq!((back.timestamp_ns, back.sequence), (42, 9));
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut frame = VideoFrame::filled(2, 2, [9, 9, 9]);
        frame.set_pixel(5, 5, [1, 1, 1]);
        assert_eq!(frame.get_pixel(2, 0), None);
        assert!(frame.pixels().all(|p| p == [9, 9, 9]));
    }

    proptest::proptest! {
        #[test]
        fn prop_crop_box_stays_inside(
            x1 in -50.0f32..80.0,
            y1 in -50.0f32..80.0,
            w in 0.0f32..90.0,
            h in 0.0f32..90.0,
        ) {
            let frame = gradient(40, 30);
            if let Some(crop) = frame.crop_box(x1, y1, x1 + w, y1 + h) {
                proptest::prop_assert!(crop.width >= 1 && crop.width <= 40);
                proptest::prop_assert!(crop.height >= 1 && crop.height <= 30);
                proptest::prop_assert!(crop.validate().is_ok());
            }
        }
    }
}
