mod motion;
mod result;

pub use motion::{
    MotionConfig, MotionDetector, DEFAULT_MIN_CHANGED_PIXELS, DEFAULT_PADDING_PX,
    DEFAULT_PIXEL_THRESHOLD,
};
pub use result::MotionOutcome;
