use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::geometry::{Point, Rect};
use super::task::TaskId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Rectangle,
    Lasso,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
}

/// Selected node ids plus the gesture currently in progress, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pub selected_node_ids: BTreeSet<TaskId>,
    pub mode: SelectionMode,
    /// World-space points of the active gesture. Rectangle gestures use the
    /// first and last point; lasso gestures use all of them as a polygon.
    pub path: Vec<Point>,
}

impl Modifiers {
    pub fn shift() -> Self {
        Self { shift: true }
    }
}

impl SelectionState {
    pub fn is_active(&self) -> bool {
        self.mode != SelectionMode::None
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_node_ids.contains(id)
    }

    pub fn begin(&mut self, mode: SelectionMode, origin: Point) {
        self.mode = mode;
        self.path.clear();
        self.path.push(origin);
    }

    pub fn extend(&mut self, points: &[Point]) {
        match self.mode {
            SelectionMode::Rectangle => {
                // Only the moving corner matters; keep origin + latest.
                if let Some(last) = points.last() {
                    self.path.truncate(1);
                    self.path.push(*last);
                }
            }
            SelectionMode::Lasso => self.path.extend_from_slice(points),
            SelectionMode::None => {}
        }
    }

    /// The rectangle spanned by a rectangle gesture.
    pub fn drag_rect(&self) -> Option<Rect> {
        if self.mode != SelectionMode::Rectangle {
            return None;
        }
        let origin = *self.path.first()?;
        let corner = *self.path.last()?;
        Some(Rect::from_corners(origin, corner))
    }

    /// Replace or union the selection with `hits`, then end the gesture.
    pub fn commit(&mut self, hits: BTreeSet<TaskId>, modifiers: Modifiers) {
        if modifiers.shift {
            self.selected_node_ids.extend(hits);
        } else {
            self.selected_node_ids = hits;
        }
        self.reset_gesture();
    }

    pub fn reset_gesture(&mut self) {
        self.mode = SelectionMode::None;
        self.path.clear();
    }
}
