use std::collections::HashSet;
use tracing::{debug, info};

use super::CanvasEngine;
use crate::domain::canvas_state::CanvasSettings;
use crate::domain::geometry::{Point, Position, Rect};
use crate::domain::task::TaskId;
use crate::services::error_handling::{log_rejection, CanvasError};

impl CanvasEngine {
    fn check_position(&self, task_id: &str, position: Position) -> Result<(), CanvasError> {
        let limit = self.config.coordinate_limit;
        if position.is_finite() && position.is_within(limit) {
            return Ok(());
        }
        let err = CanvasError::InvalidPosition {
            task_id: task_id.to_string(),
            x: position.x,
            y: position.y,
            limit,
        };
        log_rejection("update_task_position", &err);
        Err(err)
    }

    /// Grid snapping that never pushes a valid coordinate out of bounds.
    fn snap(&self, position: Position) -> Position {
        let settings = self.state.settings;
        if !settings.snap_to_grid {
            return position;
        }
        position.snapped(settings.grid_size, self.config.coordinate_limit)
    }

    fn commit_position(&mut self, task_id: &str, position: Position) -> Position {
        let position = self.snap(position);
        self.state
            .task_positions
            .insert(task_id.to_string(), position);
        self.index.upsert(task_id, position);
        position
    }

    fn commit_batch(&mut self, batch: Vec<(TaskId, Position)>) -> usize {
        let count = batch.len();
        for (task_id, position) in batch {
            self.commit_position(&task_id, position);
        }
        if count > 0 {
            self.mark_changed();
        }
        count
    }

    /// Set a node's position. While the node is being dragged the update goes
    /// through the drag throttle instead of committing immediately.
    pub fn update_task_position(&mut self, task_id: &str, position: Position) -> Result<Position, CanvasError> {
        self.check_position(task_id, position)?;
        if self.throttle.is_dragging(task_id) {
            let batch = self.throttle.offer(task_id, position, self.clock.now());
            self.commit_batch(batch);
            return Ok(self.task_position(task_id).unwrap_or(position));
        }
        let committed = self.commit_position(task_id, position);
        self.mark_changed();
        Ok(committed)
    }

    pub fn begin_drag<I, S>(&mut self, task_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.throttle
            .begin(task_ids.into_iter().map(|id| id.as_ref().to_string()));
    }

    pub fn drag_task(&mut self, task_id: &str, position: Position) -> Result<(), CanvasError> {
        self.check_position(task_id, position)?;
        let batch = self.throttle.offer(task_id, position, self.clock.now());
        self.commit_batch(batch);
        Ok(())
    }

    /// End a drag, committing `position` regardless of the throttle window.
    /// An invalid final position is rejected and the last stashed drag update lands instead.
    pub fn end_drag(&mut self, task_id: &str, position: Position) -> Result<Position, CanvasError> {
        if let Err(e) = self.check_position(task_id, position) {
            if let Some(stashed) = self.throttle.pending(task_id) {
                self.commit_position(task_id, stashed);
                self.mark_changed();
            }
            self.throttle.finish(task_id);
            return Err(e);
        }
        self.throttle.finish(task_id);
        let committed = self.commit_position(task_id, position);
        self.mark_changed();
        debug!(task_id = %task_id, x = committed.x, y = committed.y, "Drag finished");
        Ok(committed)
    }

    /// Commit drag updates whose throttle window has passed. Returns how many landed.
    pub fn tick(&mut self) -> usize {
        let batch = self.throttle.take_due(self.clock.now());
        self.commit_batch(batch)
    }

    /// Pending (not yet committed) drag position of a node.
    pub fn pending_drag_position(&self, task_id: &str) -> Option<Position> {
        self.throttle.pending(task_id)
    }

    /// Translate positioned nodes together. Rejects the whole move if any node
    /// would leave the bounds. Ids without a position are ignored.
    pub fn move_nodes<S: AsRef<str>>(&mut self, task_ids: &[S], dx: f64, dy: f64) -> Result<usize, CanvasError> {
        let moves: Vec<(TaskId, Position)> = task_ids
            .iter()
            .filter_map(|id| {
                let id = id.as_ref();
                self.task_position(id)
                    .map(|p| (id.to_string(), p.offset(dx, dy)))
            })
            .collect();
        for (task_id, position) in &moves {
            self.check_position(task_id, *position)?;
        }
        let count = moves.len();
        for (task_id, position) in moves {
            self.commit_position(&task_id, position);
        }
        if count > 0 {
            self.mark_changed();
        }
        Ok(count)
    }

    pub fn remove_task_position(&mut self, task_id: &str) -> bool {
        let removed = self.state.task_positions.remove(task_id).is_some();
        if removed {
            self.index.remove(task_id);
            self.throttle.finish(task_id);
            self.mark_changed();
        }
        removed
    }

    /// Drop positions, assignments and selection entries for tasks that no
    /// longer exist. Returns the ids whose positions were pruned.
    pub fn cleanup_orphaned_positions(&mut self) -> Vec<TaskId> {
        let live = self.tasks.task_ids();
        let (pruned, assignments) = self.prune_orphans(&live);
        if !pruned.is_empty() || assignments > 0 {
            info!(
                positions = pruned.len(),
                assignments, "Pruned orphaned canvas entries"
            );
            self.mark_changed();
        }
        pruned
    }

    pub(super) fn prune_orphans(&mut self, live: &HashSet<TaskId>) -> (Vec<TaskId>, usize) {
        let pruned: Vec<TaskId> = self
            .state
            .task_positions
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for task_id in &pruned {
            self.state.task_positions.remove(task_id);
            self.index.remove(task_id);
            self.throttle.finish(task_id);
        }

        let section_ids: HashSet<_> = self.state.sections.iter().map(|s| s.id).collect();
        let before = self.state.section_assignments.len();
        self.state
            .section_assignments
            .retain(|task_id, section_id| live.contains(task_id) && section_ids.contains(section_id));
        let assignments = before - self.state.section_assignments.len();

        self.state
            .selection
            .selected_node_ids
            .retain(|id| live.contains(id));
        (pruned, assignments)
    }

    /// Live nodes whose bounding box overlaps `rect`.
    pub fn nodes_in_rect(&self, rect: &Rect) -> Vec<TaskId> {
        let mut hits = self.index.intersecting(rect);
        if hits.is_empty() {
            return hits;
        }
        let live = self.tasks.task_ids();
        hits.retain(|id| live.contains(id));
        hits.sort();
        hits
    }

    pub fn node_at(&self, point: Point) -> Option<TaskId> {
        self.index
            .at_point(point)
            .filter(|id| self.tasks.contains(id))
    }

    pub fn update_settings(&mut self, settings: CanvasSettings) -> Result<(), CanvasError> {
        if !settings.has_valid_grid() {
            let err = CanvasError::InvalidGridSize {
                grid_size: settings.grid_size,
            };
            log_rejection("update_settings", &err);
            return Err(err);
        }
        self.state.settings = settings;
        self.mark_changed();
        Ok(())
    }
}
