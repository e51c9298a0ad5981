use std::collections::BTreeSet;
use tracing::debug;

use super::CanvasEngine;
use crate::domain::geometry::Point;
use crate::domain::selection::{Modifiers, SelectionMode};
use crate::domain::task::TaskId;

impl CanvasEngine {
    /// Start a drag gesture at a world-space origin. Restarting drops the previous gesture.
    pub fn start_selection(&mut self, mode: SelectionMode, origin: Point) {
        if mode == SelectionMode::None {
            self.state.selection.reset_gesture();
            return;
        }
        self.state.selection.begin(mode, origin);
    }

    pub fn update_selection(&mut self, points: &[Point]) {
        self.state.selection.extend(points);
    }

    /// Nodes the in-progress gesture would select, without committing.
    pub fn preview_selection(&self) -> BTreeSet<TaskId> {
        let selection = &self.state.selection;
        let hits = match selection.mode {
            SelectionMode::Rectangle => match selection.drag_rect() {
                Some(rect) if !rect.is_degenerate() => self.index.intersecting(&rect),
                _ => Vec::new(),
            },
            SelectionMode::Lasso => self.index.centers_in_polygon(&selection.path),
            SelectionMode::None => Vec::new(),
        };
        if hits.is_empty() {
            return BTreeSet::new();
        }
        let live = self.tasks.task_ids();
        hits.into_iter().filter(|id| live.contains(id)).collect()
    }

    /// Commit the gesture: shift unions into the current selection, otherwise replaces it.
    pub fn end_selection(&mut self, modifiers: Modifiers) -> &BTreeSet<TaskId> {
        if self.state.selection.is_active() {
            let hits = self.preview_selection();
            debug!(
                mode = ?self.state.selection.mode,
                hits = hits.len(),
                additive = modifiers.shift,
                "Selection committed"
            );
            self.state.selection.commit(hits, modifiers);
        }
        &self.state.selection.selected_node_ids
    }

    /// Abort the gesture, keeping the prior selection.
    pub fn cancel_selection(&mut self) {
        self.state.selection.reset_gesture();
    }

    /// Click-select. Returns false when the task is unknown.
    pub fn select_node(&mut self, task_id: &str, additive: bool) -> bool {
        if !self.tasks.contains(task_id) {
            return false;
        }
        let selected = &mut self.state.selection.selected_node_ids;
        if !additive {
            selected.clear();
        }
        selected.insert(task_id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.state.selection.selected_node_ids.clear();
    }

    /// Select every positioned node whose task still exists.
    pub fn select_all(&mut self) {
        let live = self.tasks.task_ids();
        self.state.selection.selected_node_ids = self
            .state
            .task_positions
            .keys()
            .filter(|id| live.contains(*id))
            .cloned()
            .collect();
    }
}
