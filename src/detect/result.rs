use crate::region::BoundingRegion;

/// Outcome of differencing one frame against the retained baseline.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionOutcome {
    /// No comparable baseline existed; the frame was stored as the new one.
    NoBaseline,
    /// Too few pixels changed to be worth a region.
    InsufficientMotion { changed_pixels: usize },
    /// Enough pixels changed; `region` is their padded bounding box.
    Region {
        region: BoundingRegion,
        changed_pixels: usize,
    },
}

impl MotionOutcome {
    pub fn region(&self) -> Option<BoundingRegion> {
        match self {
            MotionOutcome::Region { region, .. } => Some(*region),
            _ => None,
        }
    }

    pub fn changed_pixels(&self) -> usize {
        match self {
            MotionOutcome::NoBaseline => 0,
            MotionOutcome::InsufficientMotion { changed_pixels }
            | MotionOutcome::Region { changed_pixels, .. } => *changed_pixels,
        }
    }
}
