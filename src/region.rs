//! Resolution-independent regions of interest.

use anyhow::{anyhow, Result};
use std::str::FromStr;

use crate::CaptureError;

/// Rectangle in fractional frame coordinates.
///
/// All four fields lie in `[0, 1]` and the rectangle never extends past the
/// frame: `x + width <= 1` and `y + height <= 1`. Width and height are
/// strictly positive. The only ways to build one are the validating
/// constructors below, so every value in circulation upholds this.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingRegion {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Rectangle in pixel coordinates of one specific frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }
}

impl BoundingRegion {
    /// Strict constructor: rejects anything outside the invariants.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        let finite = [x, y, width, height].iter().all(|v| v.is_finite());
        if !finite {
            return Err(anyhow!("region coordinates must be finite"));
        }
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(anyhow!("region origin ({}, {}) outside [0,1]", x, y));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(anyhow!(
                "region extent must be positive (got {}x{})",
                width,
                height
            ));
        }
        if x + width > 1.0 || y + height > 1.0 {
            return Err(anyhow!(
                "region ({}, {}, {}, {}) extends past the frame",
                x,
                y,
                width,
                height
            ));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Region spanning two arbitrary points, clamped into the unit square.
    ///
    /// Returns `None` when the span is degenerate on either axis.
    pub fn spanning(a: (f32, f32), b: (f32, f32)) -> Option<Self> {
        let (ax, ay) = (clamp_unit(a.0), clamp_unit(a.1));
        let (bx, by) = (clamp_unit(b.0), clamp_unit(b.1));
        let x = ax.min(bx);
        let y = ay.min(by);
        Self::clamped(x, y, (bx - ax).abs(), (by - ay).abs())
    }

    /// Region for the pixel span `[x0, x1) x [y0, y1)` of a `frame_width` x
    /// `frame_height` frame.
    pub fn from_pixel_span(
        x0: u32,
        y0: u32,
        x1: u32,
        y1: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        let x1 = x1.min(frame_width);
        let y1 = y1.min(frame_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        Self::clamped(
            x0 as f32 / fw,
            y0 as f32 / fh,
            (x1 - x0) as f32 / fw,
            (y1 - y0) as f32 / fh,
        )
    }

    /// The whole frame.
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    // Extent is trimmed to `1 - origin`, which keeps `origin + extent <= 1`
    // under f32 rounding.
    fn clamped(x: f32, y: f32, width: f32, height: f32) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        let x = clamp_unit(x);
        let y = clamp_unit(y);
        let width = width.min(1.0 - x);
        let height = height.min(1.0 - y);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Project onto a concrete frame size.
    ///
    /// Edges are rounded to the nearest pixel and the result is clamped to
    /// the frame, with at least one pixel on each axis.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> PixelRect {
        let (x, width) = project_axis(self.x, self.width, frame_width);
        let (y, height) = project_axis(self.y, self.height, frame_height);
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Parses `x,y,width,height` fractions, e.g. `0.25,0.2,0.5,0.6`.
impl FromStr for BoundingRegion {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaptureError::InvalidRegion(format!("{:?}: {}", s, e)))?;
        match parts.as_slice() {
            [x, y, width, height] => Self::new(*x, *y, *width, *height)
                .map_err(|e| CaptureError::InvalidRegion(e.to_string())),
            _ => Err(CaptureError::InvalidRegion(format!(
                "expected x,y,width,height, got {:?}",
                s
            ))),
        }
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn project_axis(origin: f32, extent: f32, size: u32) -> (u32, u32) {
    if size == 0 {
        return (0, 0);
    }
    let size_f = size as f64;
    let start = ((origin as f64) * size_f).round() as u32;
    let start = start.min(size - 1);
    let end = (((origin + extent) as f64) * size_f).round() as u32;
    let end = end.clamp(start + 1, size);
    (start, end - start)
}
