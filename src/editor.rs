//! Manual region selection.
//!
//! A pointer stream in displayed-frame coordinates drives a small state
//! machine:
//!
//! ```text
//! Idle --press--> Dragging --move--> Dragging (preview)
//!                 Dragging --release--> Idle (commit last preview)
//! ```
//!
//! Coordinates are fractions of the displayed frame and are clamped into
//! `[0, 1]`, so the committed region is directly usable against any frame
//! size.

use crate::region::BoundingRegion;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Press,
    Move,
    Release,
}

/// One normalized pointer/touch sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn press(x: f32, y: f32) -> Self {
        Self {
            kind: PointerKind::Press,
            x,
            y,
        }
    }

    pub fn moved(x: f32, y: f32) -> Self {
        Self {
            kind: PointerKind::Move,
            x,
            y,
        }
    }

    pub fn release(x: f32, y: f32) -> Self {
        Self {
            kind: PointerKind::Release,
            x,
            y,
        }
    }
}

/// What the rendering layer should show after an event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditorUpdate {
    /// A drag started; nothing to draw yet.
    Started,
    /// Live rectangle while dragging.
    Preview(BoundingRegion),
    /// Drag finished; this is now the committed region.
    Committed(BoundingRegion),
    /// Drag finished without a usable rectangle. The previous committed
    /// region, if any, is kept.
    Cancelled,
    /// Event had no meaning in the current state.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum EditorState {
    Idle,
    Dragging {
        start: (f32, f32),
        preview: Option<BoundingRegion>,
    },
}

/// Drag-to-select state machine.
#[derive(Clone, Debug)]
pub struct RegionEditor {
    state: EditorState,
    committed: Option<BoundingRegion>,
}

impl RegionEditor {
    pub fn new() -> Self {
        Self {
            state: EditorState::Idle,
            committed: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, EditorState::Dragging { .. })
    }

    /// Last region committed by a completed drag.
    pub fn committed(&self) -> Option<BoundingRegion> {
        self.committed
    }

    /// Region currently being dragged out, if any.
    pub fn preview(&self) -> Option<BoundingRegion> {
        match self.state {
            EditorState::Dragging { preview, .. } => preview,
            EditorState::Idle => None,
        }
    }

    pub fn handle(&mut self, event: PointerEvent) -> EditorUpdate {
        let point = (event.x, event.y);
        match (self.state, event.kind) {
            (_, PointerKind::Press) => {
                self.state = EditorState::Dragging {
                    start: point,
                    preview: None,
                };
                EditorUpdate::Started
            }
            (EditorState::Dragging { start, preview }, PointerKind::Move) => {
                match BoundingRegion::spanning(start, point) {
                    Some(region) => {
                        self.state = EditorState::Dragging {
                            start,
                            preview: Some(region),
                        };
                        EditorUpdate::Preview(region)
                    }
                    None => {
                        // Pointer back on the start row/column: keep the
                        // last usable preview for the release.
                        self.state = EditorState::Dragging { start, preview };
                        EditorUpdate::Ignored
                    }
                }
            }
            (EditorState::Dragging { preview, .. }, PointerKind::Release) => {
                self.state = EditorState::Idle;
                match preview {
                    Some(region) => {
                        self.committed = Some(region);
                        EditorUpdate::Committed(region)
                    }
                    None => EditorUpdate::Cancelled,
                }
            }
            (EditorState::Idle, PointerKind::Move | PointerKind::Release) => EditorUpdate::Ignored,
        }
    }

    /// Commit `region` directly, ending any drag in progress.
    pub fn commit(&mut self, region: BoundingRegion) {
        self.state = EditorState::Idle;
        self.committed = Some(region);
    }
}

impl Default for RegionEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(region: BoundingRegion, expected: [f32; 4]) {
        let actual = [region.x(), region.y(), region.width(), region.height()];
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-6, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn drag_commits_the_spanned_region() {
        let mut editor = RegionEditor::new();
        assert_eq!(editor.handle(PointerEvent::press(0.2, 0.2)), EditorUpdate::Started);
        match editor.handle(PointerEvent::moved(0.6, 0.5)) {
            EditorUpdate::Preview(region) => approx(region, [0.2, 0.2, 0.4, 0.3]),
            other => panic!("expected preview, got {:?}", other),
        }
        match editor.handle(PointerEvent::release(0.6, 0.5)) {
            EditorUpdate::Committed(region) => approx(region, [0.2, 0.2, 0.4, 0.3]),
            other => panic!("expected commit, got {:?}", other),
        }
        assert!(!editor.is_dragging());
        approx(editor.committed().unwrap(), [0.2, 0.2, 0.4, 0.3]);
    }

    #[test]
    fn dragging_up_and_left_normalizes_the_origin() {
        let mut editor = RegionEditor::new();
        editor.handle(PointerEvent::press(0.8, 0.9));
        editor.handle(PointerEvent::moved(0.3, 0.4));
        match editor.handle(PointerEvent::release(0.3, 0.4)) {
            EditorUpdate::Committed(region) => approx(region, [0.3, 0.4, 0.5, 0.5]),
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[test]
    fn release_commits_last_preview_not_release_point() {
        let mut editor = RegionEditor::new();
        editor.handle(PointerEvent::press(0.1, 0.1));
        editor.handle(PointerEvent::moved(0.5, 0.5));
        match editor.handle(PointerEvent::release(0.9, 0.9)) {
            EditorUpdate::Committed(region) => approx(region, [0.1, 0.1, 0.4, 0.4]),
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[test]
    fn click_without_drag_keeps_previous_region() {
        let mut editor = RegionEditor::new();
        editor.handle(PointerEvent::press(0.1, 0.1));
        editor.handle(PointerEvent::moved(0.3, 0.3));
        editor.handle(PointerEvent::release(0.3, 0.3));

        editor.handle(PointerEvent::press(0.7, 0.7));
        assert_eq!(
            editor.handle(PointerEvent::release(0.7, 0.7)),
            EditorUpdate::Cancelled
        );
        approx(editor.committed().unwrap(), [0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn moves_while_idle_are_ignored() {
        let mut editor = RegionEditor::new();
        assert_eq!(editor.handle(PointerEvent::moved(0.5, 0.5)), EditorUpdate::Ignored);
        assert_eq!(editor.handle(PointerEvent::release(0.5, 0.5)), EditorUpdate::Ignored);
        assert!(editor.committed().is_none());
    }

    #[test]
    fn out_of_range_points_are_clamped() {
        let mut editor = RegionEditor::new();
        editor.handle(PointerEvent::press(-0.5, 0.5));
        editor.handle(PointerEvent::moved(1.5, 2.0));
        let region = match editor.handle(PointerEvent::release(1.5, 2.0)) {
            EditorUpdate::Committed(region) => region,
            other => panic!("expected commit, got {:?}", other),
        };
        approx(region, [0.0, 0.5, 1.0, 0.5]);
    }
}
