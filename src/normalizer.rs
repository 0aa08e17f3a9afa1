//! Crop-and-resample to the fixed input size of the recognition service.

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use serde::Deserialize;

use crate::frame::PixelBuffer;
use crate::region::{BoundingRegion, PixelRect};
use crate::CaptureError;

pub const DEFAULT_OUTPUT_SIZE: u32 = 64;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Side of the square output, in pixels.
    pub output_size: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            output_size: DEFAULT_OUTPUT_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A square, encoded crop ready for submission.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    pixels: PixelBuffer,
    jpeg: Vec<u8>,
    source_rect: PixelRect,
}

impl NormalizedImage {
    /// Resampled pixels, exactly `output_size` on each side.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Area of the source frame the crop was taken from.
    pub fn source_rect(&self) -> PixelRect {
        self.source_rect
    }

    /// `data:image/jpeg;base64,…`, the form the service accepts.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RegionNormalizer {
    config: NormalizeConfig,
}

impl RegionNormalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> NormalizeConfig {
        self.config
    }

    /// Crop `frame` to `region` (or take all of it) and resample to a square.
    ///
    /// The aspect ratio is not preserved: a wide crop is squeezed.
    pub fn normalize(
        &self,
        frame: &PixelBuffer,
        region: Option<&BoundingRegion>,
    ) -> Result<NormalizedImage, CaptureError> {
        let size = self.config.output_size;
        if size == 0 {
            return Err(CaptureError::Normalize("output size must be non-zero".into()));
        }
        let (width, height) = frame.dimensions();
        let rect = region
            .copied()
            .unwrap_or_else(BoundingRegion::full)
            .to_pixel_rect(width, height);

        let image = frame
            .to_image()
            .map_err(|e| CaptureError::Normalize(e.to_string()))?;
        let cropped = imageops::crop_imm(&image, rect.x, rect.y, rect.width, rect.height).to_image();
        let resized = imageops::resize(&cropped, size, size, FilterType::Triangle);

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality);
        resized
            .write_with_encoder(encoder)
            .map_err(|e| CaptureError::Normalize(format!("jpeg encode: {}", e)))?;

        Ok(NormalizedImage {
            pixels: PixelBuffer::from_image(resized),
            jpeg,
            source_rect: rect,
        })
    }
}

impl Default for RegionNormalizer {
    fn default() -> Self {
        Self::new(NormalizeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_always_square() {
        let normalizer = RegionNormalizer::default();
        let frame = PixelBuffer::filled(640, 480, [10, 200, 30]).unwrap();
        let regions = [
            None,
            Some(BoundingRegion::new(0.0, 0.0, 0.01, 0.9).unwrap()),
            Some(BoundingRegion::new(0.5, 0.5, 0.5, 0.5).unwrap()),
            Some(BoundingRegion::new(0.999, 0.0, 0.001, 0.001).unwrap()),
        ];
        for region in regions.iter() {
            let out = normalizer.normalize(&frame, region.as_ref()).unwrap();
            assert_eq!(out.pixels().dimensions(), (64, 64));
        }
    }

    #[test]
    fn crop_takes_pixels_from_the_region() {
        let frame = PixelBuffer::filled(100, 100, [0, 0, 0])
            .unwrap()
            .with_block(50, 0, 50, 100, [255, 255, 255]);
        let right_half = BoundingRegion::new(0.5, 0.0, 0.5, 1.0).unwrap();
        let out = RegionNormalizer::default()
            .normalize(&frame, Some(&right_half))
            .unwrap();
        assert_eq!(
            out.source_rect(),
            PixelRect {
                x: 50,
                y: 0,
                width: 50,
                height: 100
            }
        );
        assert_eq!(out.pixels().pixel(32, 32), Some([255, 255, 255]));
    }

    #[test]
    fn encodes_a_decodable_jpeg() {
        let frame = PixelBuffer::filled(32, 16, [120, 120, 120]).unwrap();
        let out = RegionNormalizer::default().normalize(&frame, None).unwrap();
        assert_eq!(&out.jpeg()[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(out.jpeg()).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (64, 64));
        assert!(out.to_data_url().starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn output_size_is_configurable() {
        let normalizer = RegionNormalizer::new(NormalizeConfig {
            output_size: 28,
            jpeg_quality: 50,
        });
        let frame = PixelBuffer::filled(10, 10, [1, 1, 1]).unwrap();
        let out = normalizer.normalize(&frame, None).unwrap();
        assert_eq!(out.pixels().dimensions(), (28, 28));
    }
}
