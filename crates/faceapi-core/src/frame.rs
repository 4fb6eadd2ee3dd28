//! Decoded image frames.
//!
//! Every model in this crate consumes an interleaved 8-bit RGB buffer. Uploads
//! arrive as arbitrary encoded bytes, so decoding is also where the
//! "unusable image" failures are classified.

use image::{DynamicImage, RgbImage};
use std::path::Path;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Image file is empty")]
    Empty,
    #[error("Image could not be decoded: {0}")]
    Corrupt(String),
    #[error("Unsupported image type, must be 8-bit gray or RGB image")]
    UnsupportedColorDepth,
    #[error("Image file not found: {0}")]
    NotFound(String),
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded RGB image.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FrameError::NotFound(path.display().to_string()),
            _ => FrameError::Io(e),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Decode an encoded image (PNG, JPEG, GIF, BMP, ...).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }
        let img =
            image::load_from_memory(bytes).map_err(|e| FrameError::Corrupt(e.to_string()))?;
        Self::from_image(img)
    }

    /// Convert a decoded image, rejecting anything that is not 8 bits per channel.
    pub fn from_image(img: DynamicImage) -> Result<Self, FrameError> {
        match &img {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_) => {}
            _ => return Err(FrameError::UnsupportedColorDepth),
        }

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }

        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
        })
    }

    /// Wrap a raw interleaved RGB buffer.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * RGB_CHANNELS;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        if expected == 0 {
            return Err(FrameError::Empty);
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// BT.601 luma, one byte per pixel.
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.data
            .chunks_exact(RGB_CHANNELS)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}
