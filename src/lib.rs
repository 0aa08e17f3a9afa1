//! Gesture capture pipeline
//!
//! Isolates the region of a camera feed that contains a hand gesture and
//! submits it to a remote letter-recognition service at a bounded rate.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource ──> { MotionDetector | RegionEditor } ──> BoundingRegion
//!             ──> RegionNormalizer ──> Recognizer ──> RecognitionResult
//! ```
//!
//! The [`CaptureScheduler`] owns the cadence: it runs the pipeline once per
//! tick or on demand, and never lets two submissions overlap.
//!
//! # Module Structure
//!
//! - `frame`: immutable RGB pixel buffers
//! - `ingest`: frame sources (synthetic, HTTP snapshot, still images)
//! - `detect`: frame-difference motion detection
//! - `editor`: drag-to-select region state machine
//! - `mode`: manual/automatic region sources
//! - `normalizer`: crop, resample and JPEG-encode
//! - `recognize`: recognition clients
//! - `scheduler`: capture cadence and in-flight control
//! - `config`: file + environment configuration

use std::fmt;

pub mod config;
pub mod detect;
pub mod editor;
pub mod frame;
pub mod ingest;
pub mod mode;
pub mod normalizer;
pub mod recognize;
pub mod region;
pub mod scheduler;

pub use config::CaptureConfig;
pub use detect::{MotionConfig, MotionDetector, MotionOutcome};
pub use editor::{EditorUpdate, PointerEvent, PointerKind, RegionEditor};
pub use frame::PixelBuffer;
pub use ingest::{FrameSource, PixelFormat};
pub use mode::{CaptureMode, RegionSource};
pub use normalizer::{NormalizedImage, RegionNormalizer};
pub use recognize::{RecognitionResult, Recognizer};
pub use region::{BoundingRegion, PixelRect};
pub use scheduler::{CaptureOptions, CaptureScheduler, SchedulerStats, SkipReason, TickOutcome};

/// Errors a caller is expected to match on.
///
/// Everything else surfaces as `anyhow::Error`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureError {
    /// The operation belongs to the other capture mode.
    WrongMode {
        expected: CaptureMode,
        actual: CaptureMode,
    },
    /// Manual mode with no region selected yet.
    MissingRegion,
    InvalidRegion(String),
    Normalize(String),
    /// A thread panicked while holding pipeline state.
    Poisoned,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::WrongMode { expected, actual } => write!(
                f,
                "only available in {} mode (currently {})",
                expected, actual
            ),
            CaptureError::MissingRegion => {
                write!(f, "select a region first: drag a rectangle around your hand")
            }
            CaptureError::InvalidRegion(reason) => write!(f, "invalid region: {}", reason),
            CaptureError::Normalize(reason) => write!(f, "could not prepare image: {}", reason),
            CaptureError::Poisoned => write!(f, "capture state poisoned by an earlier panic"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_convert_into_anyhow() {
        let err: anyhow::Error = CaptureError::MissingRegion.into();
        assert!(err.to_string().starts_with("select a region first"));
        assert_eq!(
            err.downcast_ref::<CaptureError>(),
            Some(&CaptureError::MissingRegion)
        );
    }
}
