//! In-memory image container.
//!
//! - `Frame`: owned RGB8 pixels. Every conversion (BGR in, BGR out, annotation)
//!   produces a new buffer; nothing aliases across a conversion boundary.
//! - `PixelOrder`: channel order of raw buffers handed to `Frame::from_raw`.
//!
//! Frames are always 3-channel with non-zero dimensions. Anything else is
//! rejected at construction with `LeafError::InvalidInput`, so every `Frame`
//! that reaches the detector is valid by construction.

use image::RgbImage;
use sha2::{Digest, Sha256};

use crate::error::{LeafError, LeafResult};

/// Number of color channels carried by every frame.
pub const CHANNELS: usize = 3;

/// Channel order of a raw interleaved buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a decoded RGB image. Zero-sized images are rejected.
    pub fn from_rgb_image(image: RgbImage) -> LeafResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(LeafError::InvalidInput(format!(
                "image has empty dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image })
    }

    /// Build a frame from an interleaved pixel buffer.
    ///
    /// `channels` must be 3 and `data` must hold exactly `width * height * 3`
    /// bytes. BGR input is swapped into a fresh RGB buffer.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: usize,
        order: PixelOrder,
        data: Vec<u8>,
    ) -> LeafResult<Self> {
        if channels != CHANNELS {
            return Err(LeafError::InvalidInput(format!(
                "expected {} color channels, got {}",
                CHANNELS, channels
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| LeafError::InvalidInput("frame dimensions overflow".into()))?;
        if data.len() != expected {
            return Err(LeafError::InvalidInput(format!(
                "expected {} bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        let data = match order {
            PixelOrder::Rgb => data,
            PixelOrder::Bgr => swap_red_blue(&data),
        };
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| LeafError::InvalidInput("pixel buffer rejected".into()))?;
        Self::from_rgb_image(image)
    }

    /// Convenience for camera backends that deliver BGR24.
    pub fn from_bgr_bytes(width: u32, height: u32, data: Vec<u8>) -> LeafResult<Self> {
        Self::from_raw(width, height, CHANNELS, PixelOrder::Bgr, data)
    }

    /// Decode packed YUYV 4:2:2 (`Y0 U Y1 V` per pixel pair) with BT.601
    /// coefficients. `width` must be even.
    pub fn from_yuyv(width: u32, height: u32, data: &[u8]) -> LeafResult<Self> {
        if width % 2 != 0 {
            return Err(LeafError::InvalidInput(format!(
                "yuyv frame width must be even, got {}",
                width
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(|| LeafError::InvalidInput("frame dimensions overflow".into()))?;
        let data = data.get(..expected).ok_or_else(|| {
            LeafError::InvalidInput(format!(
                "expected {} yuyv bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                data.len()
            ))
        })?;

        let mut rgb = Vec::with_capacity(expected / 2 * CHANNELS);
        for chunk in data.chunks_exact(4) {
            let u = chunk[1] as f32 - 128.0;
            let v = chunk[3] as f32 - 128.0;
            for y in [chunk[0], chunk[2]] {
                let y = y as f32;
                rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
                rgb.push((y - 0.344_136 * u - 0.714_136 * v).clamp(0.0, 255.0) as u8);
                rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
            }
        }
        Self::from_raw(width, height, CHANNELS, PixelOrder::Rgb, rgb)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Read-only RGB pixels, row-major, interleaved.
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// A new buffer in BGR order.
    pub fn to_bgr_bytes(&self) -> Vec<u8> {
        swap_red_blue(self.image.as_raw())
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable pixels for drawing. Dimensions must not change.
    pub(crate) fn canvas_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// SHA-256 over dimensions and pixels. Two frames share a digest only if
    /// they are pixel-identical.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.width().to_le_bytes());
        hasher.update(self.height().to_le_bytes());
        hasher.update(self.image.as_raw());
        hasher.finalize().into()
    }

    /// Short hex prefix of the digest, for log lines.
    pub fn short_id(&self) -> String {
        hex::encode(&self.digest()[..6])
    }
}

fn swap_red_blue(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(CHANNELS) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
