//! Captured frame container.
//!
//! `PixelBuffer` is the unit every pipeline stage exchanges:
//!
//! - Frame sources produce one per pull.
//! - The motion detector reads it and retains it as its baseline.
//! - The region normalizer reads it and produces a new, smaller one.
//!
//! Pixel data is packed RGB24 and is never mutated after construction.
//! Clones share the same allocation, so retaining a baseline is cheap.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::Arc;

use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

/// Immutable RGB frame.
#[derive(Clone)]
pub struct PixelBuffer {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Build a buffer from packed RGB24 bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Self::from_raw(&data, width, height, PixelFormat::Rgb24)
    }

    /// Build a buffer from raw bytes in any supported input format.
    ///
    /// Alpha is discarded and NV12 is converted, so downstream stages only
    /// ever see RGB.
    pub fn from_raw(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "frame dimensions must be non-zero (got {}x{})",
                width,
                height
            ));
        }
        let rgb = normalize_to_rgb(pixels, width, height, format)?;
        Ok(Self {
            data: rgb.into(),
            width,
            height,
        })
    }

    /// Single-color frame. Mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let count = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let mut data = Vec::with_capacity(count * 3);
        for _ in 0..count {
            data.extend_from_slice(&rgb);
        }
        Self::from_rgb(data, width, height)
    }

    pub(crate) fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw().into(),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Packed RGB24 bytes, row-major.
    pub fn as_rgb(&self) -> &[u8] {
        &self.data
    }

    /// RGB triple at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Copy into an `image` buffer for cropping, resampling and encoding.
    pub(crate) fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
            .ok_or_else(|| anyhow!("pixel buffer length does not match its dimensions"))
    }

    /// Returns a copy with the given rectangle painted in one color.
    ///
    /// The rectangle is clipped to the frame.
    pub fn with_block(&self, x: u32, y: u32, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = self.data.to_vec();
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y.min(self.height)..y_end {
            for col in x.min(self.width)..x_end {
                let offset = (row as usize * self.width as usize + col as usize) * 3;
                data[offset..offset + 3].copy_from_slice(&rgb);
            }
        }
        Self {
            data: data.into(),
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(PixelBuffer::from_rgb(vec![], 0, 4).is_err());
    }

    #[test]
    fn rgba_input_drops_alpha() -> Result<()> {
        let rgba = vec![10, 20, 30, 255, 40, 50, 60, 0];
        let frame = PixelBuffer::from_raw(&rgba, 2, 1, PixelFormat::Rgba32)?;
        assert_eq!(frame.as_rgb(), &[10, 20, 30, 40, 50, 60]);
        Ok(())
    }

    #[test]
    fn pixel_lookup_is_bounds_checked() -> Result<()> {
        let frame = PixelBuffer::filled(3, 2, [1, 2, 3])?;
        assert_eq!(frame.pixel(2, 1), Some([1, 2, 3]));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
        Ok(())
    }

    #[test]
    fn with_block_leaves_original_untouched() -> Result<()> {
        let base = PixelBuffer::filled(4, 4, [0, 0, 0])?;
        let painted = base.with_block(1, 1, 10, 10, [255, 255, 255]);
        assert_eq!(base.pixel(2, 2), Some([0, 0, 0]));
        assert_eq!(painted.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(painted.pixel(3, 3), Some([255, 255, 255]));
        Ok(())
    }
}
