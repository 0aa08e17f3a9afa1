//! Region sources: where the region of interest for a tick comes from.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::detect::{MotionConfig, MotionDetector, MotionOutcome};
use crate::editor::{EditorUpdate, PointerEvent, RegionEditor};
use crate::frame::PixelBuffer;
use crate::region::BoundingRegion;
use crate::CaptureError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// The user drags out the region.
    Manual,
    /// The motion detector proposes a region every tick.
    Automatic,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Manual => write!(f, "manual"),
            CaptureMode::Automatic => write!(f, "automatic"),
        }
    }
}

impl FromStr for CaptureMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(CaptureMode::Manual),
            "automatic" | "auto" => Ok(CaptureMode::Automatic),
            other => Err(anyhow::anyhow!(
                "unknown capture mode {:?} (expected manual or automatic)",
                other
            )),
        }
    }
}

/// How a tick resolved its region.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionResolution {
    Found(BoundingRegion),
    /// Manual mode without a committed region.
    NotSelected,
    /// Automatic mode where the detector produced nothing this tick.
    NoMotion(MotionOutcome),
}

/// The active region source. Exactly one exists at a time; switching mode
/// replaces it wholesale, which drops the other mode's region and the
/// motion baseline.
pub enum RegionSource {
    Manual(RegionEditor),
    Automatic {
        detector: MotionDetector,
        current: Option<BoundingRegion>,
    },
}

impl RegionSource {
    pub fn new(mode: CaptureMode, motion: MotionConfig) -> Self {
        match mode {
            CaptureMode::Manual => RegionSource::Manual(RegionEditor::new()),
            CaptureMode::Automatic => RegionSource::Automatic {
                detector: MotionDetector::new(motion),
                current: None,
            },
        }
    }

    pub fn mode(&self) -> CaptureMode {
        match self {
            RegionSource::Manual(_) => CaptureMode::Manual,
            RegionSource::Automatic { .. } => CaptureMode::Automatic,
        }
    }

    /// Switch to `mode`. Returns `false` when already in that mode, in which
    /// case nothing is cleared.
    pub fn switch(&mut self, mode: CaptureMode, motion: MotionConfig) -> bool {
        if self.mode() == mode {
            return false;
        }
        *self = RegionSource::new(mode, motion);
        true
    }

    /// Feed a pointer event to the editor.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<EditorUpdate, CaptureError> {
        match self {
            RegionSource::Manual(editor) => Ok(editor.handle(event)),
            RegionSource::Automatic { .. } => Err(CaptureError::WrongMode {
                expected: CaptureMode::Manual,
                actual: CaptureMode::Automatic,
            }),
        }
    }

    /// Commit a region without a drag (manual mode only).
    pub fn commit(&mut self, region: BoundingRegion) -> Result<(), CaptureError> {
        match self {
            RegionSource::Manual(editor) => {
                editor.commit(region);
                Ok(())
            }
            RegionSource::Automatic { .. } => Err(CaptureError::WrongMode {
                expected: CaptureMode::Manual,
                actual: CaptureMode::Automatic,
            }),
        }
    }

    /// Region shown to the user right now: the committed manual region or
    /// the last detected one.
    pub fn current(&self) -> Option<BoundingRegion> {
        match self {
            RegionSource::Manual(editor) => editor.committed(),
            RegionSource::Automatic { current, .. } => *current,
        }
    }

    /// Resolve the region for `frame`. In automatic mode this runs the
    /// detector, which also advances its baseline.
    pub fn resolve(&mut self, frame: &PixelBuffer) -> RegionResolution {
        match self {
            RegionSource::Manual(editor) => match editor.committed() {
                Some(region) => RegionResolution::Found(region),
                None => RegionResolution::NotSelected,
            },
            RegionSource::Automatic { detector, current } => {
                let outcome = detector.analyze(frame);
                *current = outcome.region();
                match outcome.region() {
                    Some(region) => RegionResolution::Found(region),
                    None => RegionResolution::NoMotion(outcome),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(source: &mut RegionSource) {
        source.handle_pointer(PointerEvent::press(0.1, 0.1)).unwrap();
        source.handle_pointer(PointerEvent::moved(0.5, 0.5)).unwrap();
        source.handle_pointer(PointerEvent::release(0.5, 0.5)).unwrap();
    }

    #[test]
    fn pointer_events_are_rejected_in_automatic_mode() {
        let mut source = RegionSource::new(CaptureMode::Automatic, MotionConfig::default());
        let err = source
            .handle_pointer(PointerEvent::press(0.1, 0.1))
            .unwrap_err();
        assert!(matches!(err, CaptureError::WrongMode { .. }));
    }

    #[test]
    fn switching_mode_clears_committed_region() {
        let mut source = RegionSource::new(CaptureMode::Manual, MotionConfig::default());
        drag(&mut source);
        assert!(source.current().is_some());

        assert!(source.switch(CaptureMode::Automatic, MotionConfig::default()));
        assert!(source.current().is_none());
        assert!(source.switch(CaptureMode::Manual, MotionConfig::default()));
        assert!(source.current().is_none());
    }

    #[test]
    fn switching_to_same_mode_keeps_state() {
        let mut source = RegionSource::new(CaptureMode::Manual, MotionConfig::default());
        drag(&mut source);
        assert!(!source.switch(CaptureMode::Manual, MotionConfig::default()));
        assert!(source.current().is_some());
    }

    #[test]
    fn switching_mode_drops_the_motion_baseline() {
        let frame = PixelBuffer::filled(16, 16, [50, 50, 50]).unwrap();
        let mut source = RegionSource::new(CaptureMode::Automatic, MotionConfig::default());
        source.resolve(&frame);
        source.switch(CaptureMode::Manual, MotionConfig::default());
        source.switch(CaptureMode::Automatic, MotionConfig::default());
        assert_eq!(
            source.resolve(&frame),
            RegionResolution::NoMotion(MotionOutcome::NoBaseline)
        );
    }

    #[test]
    fn manual_without_selection_resolves_to_not_selected() {
        let frame = PixelBuffer::filled(8, 8, [0, 0, 0]).unwrap();
        let mut source = RegionSource::new(CaptureMode::Manual, MotionConfig::default());
        assert_eq!(source.resolve(&frame), RegionResolution::NotSelected);
    }

    #[test]
    fn mode_parses_from_strings() {
        assert_eq!("Manual".parse::<CaptureMode>().unwrap(), CaptureMode::Manual);
        assert_eq!("auto".parse::<CaptureMode>().unwrap(), CaptureMode::Automatic);
        assert!("sometimes".parse::<CaptureMode>().is_err());
    }
}
