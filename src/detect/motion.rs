use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::result::MotionOutcome;
use crate::frame::PixelBuffer;
use crate::region::BoundingRegion;

pub const DEFAULT_PIXEL_THRESHOLD: u32 = 30;
pub const DEFAULT_MIN_CHANGED_PIXELS: usize = 100;
pub const DEFAULT_PADDING_PX: u32 = 50;

/// Tuning for the frame-difference heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// A pixel counts as changed when `|dr| + |dg| + |db|` exceeds this.
    pub pixel_threshold: u32,
    /// Fewer changed pixels than this yields no region.
    pub min_changed_pixels: usize,
    /// Padding added on every side of the changed-pixel bounding box.
    pub padding_px: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            min_changed_pixels: DEFAULT_MIN_CHANGED_PIXELS,
            padding_px: DEFAULT_PADDING_PX,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pixel_threshold >= 3 * 255 {
            return Err(anyhow!(
                "motion pixel_threshold {} can never be exceeded (max difference is 765)",
                self.pixel_threshold
            ));
        }
        if self.min_changed_pixels == 0 {
            return Err(anyhow!("motion min_changed_pixels must be at least 1"));
        }
        Ok(())
    }
}

/// Frame-difference motion detector.
///
/// Each call compares the incoming frame against the previous one only; there
/// is no accumulated background model. The baseline is replaced on every
/// call whatever the outcome, so detection always runs one frame behind.
///
/// The detector is single-consumer: calls must not interleave.
pub struct MotionDetector {
    config: MotionConfig,
    baseline: Option<PixelBuffer>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            baseline: None,
        }
    }

    pub fn config(&self) -> MotionConfig {
        self.config
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Forget the retained baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Region of motion relative to the previous frame, if any.
    pub fn detect(&mut self, current: &PixelBuffer) -> Option<BoundingRegion> {
        self.analyze(current).region()
    }

    /// Like [`detect`](Self::detect), but reports why no region was found.
    pub fn analyze(&mut self, current: &PixelBuffer) -> MotionOutcome {
        let previous = self.baseline.replace(current.clone());
        let Some(previous) = previous else {
            return MotionOutcome::NoBaseline;
        };
        if previous.dimensions() != current.dimensions() {
            log::debug!(
                "motion baseline {}x{} does not match frame {}x{}; restarting",
                previous.width(),
                previous.height(),
                current.width(),
                current.height()
            );
            return MotionOutcome::NoBaseline;
        }

        let Some(bounds) = changed_bounds(&previous, current, self.config.pixel_threshold) else {
            return MotionOutcome::InsufficientMotion { changed_pixels: 0 };
        };
        if bounds.count < self.config.min_changed_pixels {
            return MotionOutcome::InsufficientMotion {
                changed_pixels: bounds.count,
            };
        }

        let pad = self.config.padding_px;
        let (width, height) = current.dimensions();
        let x0 = bounds.min_x.saturating_sub(pad);
        let y0 = bounds.min_y.saturating_sub(pad);
        let x1 = bounds.max_x.saturating_add(1).saturating_add(pad).min(width);
        let y1 = bounds.max_y.saturating_add(1).saturating_add(pad).min(height);

        match BoundingRegion::from_pixel_span(x0, y0, x1, y1, width, height) {
            Some(region) => MotionOutcome::Region {
                region,
                changed_pixels: bounds.count,
            },
            None => MotionOutcome::InsufficientMotion {
                changed_pixels: bounds.count,
            },
        }
    }
}

struct ChangedBounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    count: usize,
}

fn changed_bounds(
    previous: &PixelBuffer,
    current: &PixelBuffer,
    threshold: u32,
) -> Option<ChangedBounds> {
    let width = current.width() as usize;
    let mut bounds: Option<ChangedBounds> = None;

    let pairs = previous
        .as_rgb()
        .chunks_exact(3)
        .zip(current.as_rgb().chunks_exact(3));
    for (index, (a, b)) in pairs.enumerate() {
        let diff = a[0].abs_diff(b[0]) as u32
            + a[1].abs_diff(b[1]) as u32
            + a[2].abs_diff(b[2]) as u32;
        if diff <= threshold {
            continue;
        }
        let x = (index % width) as u32;
        let y = (index / width) as u32;
        match bounds.as_mut() {
            Some(b) => {
                b.min_x = b.min_x.min(x);
                b.max_x = b.max_x.max(x);
                b.min_y = b.min_y.min(y);
                b.max_y = b.max_y.max(y);
                b.count += 1;
            }
            None => {
                bounds = Some(ChangedBounds {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    count: 1,
                });
            }
        }
    }

    bounds
}
