use std::fmt;

use crate::detect::MotionOutcome;
use crate::recognize::RecognitionResult;
use crate::CaptureError;

/// Why a capture cycle ended before dispatching.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// Another dispatch is still outstanding.
    InFlight,
    /// The frame source had nothing to offer.
    FrameUnavailable,
    /// Automatic mode found no region this cycle.
    NoRegion(MotionOutcome),
    /// The scheduler was stopped, or the ticker that fired was replaced,
    /// before anything was submitted.
    Superseded,
}

/// Result of one run of the capture sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The crop was submitted. A successful result becomes the latest
    /// result; a failed one is only reported.
    Dispatched(RecognitionResult),
    /// The crop was submitted but the scheduler was stopped before the
    /// answer arrived. The result is not applied.
    Discarded(RecognitionResult),
    Skipped(SkipReason),
    /// A precondition failed; nothing was submitted.
    Rejected(CaptureError),
}

impl TickOutcome {
    pub fn result(&self) -> Option<&RecognitionResult> {
        match self {
            TickOutcome::Dispatched(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped(_))
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InFlight => write!(f, "in flight"),
            SkipReason::FrameUnavailable => write!(f, "no frame"),
            SkipReason::NoRegion(_) => write!(f, "no region"),
            SkipReason::Superseded => write!(f, "superseded"),
        }
    }
}

impl fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickOutcome::Dispatched(result) => write!(f, "dispatched: {}", result),
            TickOutcome::Discarded(result) => write!(f, "discarded: {}", result),
            TickOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            TickOutcome::Rejected(err) => write!(f, "rejected: {}", err),
        }
    }
}

/// Counters since the scheduler was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Periodic ticks that fired.
    pub ticks: u64,
    /// Deadlines dropped because a tick overran the period.
    pub missed_ticks: u64,
    pub triggers: u64,
    pub dispatches: u64,
    /// Dispatches whose result reported a failure.
    pub failures: u64,
    pub discarded: u64,
    pub skipped_in_flight: u64,
    pub skipped_no_frame: u64,
    pub skipped_no_region: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lines() {
        let no_region = TickOutcome::Skipped(SkipReason::NoRegion(
            MotionOutcome::InsufficientMotion { changed_pixels: 0 },
        ));
        assert_eq!(no_region.to_string(), "skipped: no region");
        assert_eq!(
            TickOutcome::Skipped(SkipReason::InFlight).to_string(),
            "skipped: in flight"
        );
        assert_eq!(
            TickOutcome::Dispatched(RecognitionResult::success('C', 0.5)).to_string(),
            "dispatched: C (50%)"
        );
    }
}
