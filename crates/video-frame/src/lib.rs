//! Video Frame Buffers
//!
//! Owned RGB frames handed to the road scene analyzer:
//! - Buffer validation and pixel access
//! - Cropping by detector bounding box (clamped to the frame)
//! - Conversion to and from `image::RgbImage`
//! - Loading and saving still images

pub mod frame;

pub use frame::VideoFrame;

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Empty frame ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
