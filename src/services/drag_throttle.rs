use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::domain::geometry::Position;
use crate::domain::task::TaskId;

/// Rate limiter for drag-time position commits.
///
/// At most one batch is released per `interval`. Updates arriving inside the
/// window are stashed, latest per task wins, and released by the next update
/// or `take_due` once the window has passed.
#[derive(Debug, Clone)]
pub struct DragThrottle {
    interval: Duration,
    last_commit: Option<Instant>,
    pending: BTreeMap<TaskId, Position>,
    dragging: BTreeSet<TaskId>,
}

impl DragThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_commit: None,
            pending: BTreeMap::new(),
            dragging: BTreeSet::new(),
        }
    }

    pub fn begin<I: IntoIterator<Item = TaskId>>(&mut self, task_ids: I) {
        self.dragging.extend(task_ids);
    }

    pub fn is_dragging(&self, task_id: &str) -> bool {
        self.dragging.contains(task_id)
    }

    pub fn pending(&self, task_id: &str) -> Option<Position> {
        self.pending.get(task_id).copied()
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_commit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Offer a drag update. Returns the batch to commit now, or an empty batch
    /// when the update was stashed for later.
    pub fn offer(&mut self, task_id: &str, position: Position, now: Instant) -> Vec<(TaskId, Position)> {
        self.dragging.insert(task_id.to_string());
        self.pending.insert(task_id.to_string(), position);
        if self.window_open(now) {
            self.last_commit = Some(now);
            std::mem::take(&mut self.pending).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Release stashed updates whose window has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(TaskId, Position)> {
        if self.pending.is_empty() || !self.window_open(now) {
            return Vec::new();
        }
        self.last_commit = Some(now);
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// End the drag for `task_id`; its stashed update is superseded by the final position.
    pub fn finish(&mut self, task_id: &str) {
        self.pending.remove(task_id);
        self.dragging.remove(task_id);
        if self.dragging.is_empty() {
            self.last_commit = None;
        }
    }

    /// Drop everything, e.g. when a session ends mid-drag.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.dragging.clear();
        self.last_commit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(16);

    #[test]
    fn test_first_update_commits_immediately() {
        let mut throttle = DragThrottle::new(WINDOW);
        let now = Instant::now();
        let batch = throttle.offer("a", Position::new(1.0, 1.0), now);
        assert_eq!(batch, vec![("a".to_string(), Position::new(1.0, 1.0))]);
        assert_eq!(throttle.pending("a"), None);
    }

    #[test]
    fn test_updates_inside_window_are_coalesced() {
        let mut throttle = DragThrottle::new(WINDOW);
        let t0 = Instant::now();
        throttle.offer("a", Position::new(100.0, 100.0), t0);

        assert!(throttle.offer("a", Position::new(103.0, 101.0), t0 + Duration::from_millis(5)).is_empty());
        assert!(throttle.offer("a", Position::new(105.0, 102.0), t0 + Duration::from_millis(9)).is_empty());
        assert_eq!(throttle.pending("a"), Some(Position::new(105.0, 102.0)));

        assert!(throttle.take_due(t0 + Duration::from_millis(15)).is_empty());
        let due = throttle.take_due(t0 + WINDOW);
        assert_eq!(due, vec![("a".to_string(), Position::new(105.0, 102.0))]);
    }

    #[test]
    fn test_batch_releases_every_pending_node() {
        let mut throttle = DragThrottle::new(WINDOW);
        let t0 = Instant::now();
        throttle.offer("a", Position::new(0.0, 0.0), t0);
        throttle.offer("b", Position::new(5.0, 5.0), t0 + Duration::from_millis(1));

        let batch = throttle.offer("a", Position::new(2.0, 2.0), t0 + Duration::from_millis(20));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_finish_discards_stashed_update() {
        let mut throttle = DragThrottle::new(WINDOW);
        let t0 = Instant::now();
        throttle.offer("a", Position::new(0.0, 0.0), t0);
        throttle.offer("a", Position::new(9.0, 9.0), t0 + Duration::from_millis(2));

        throttle.finish("a");
        assert_eq!(throttle.pending("a"), None);
        assert!(!throttle.is_dragging("a"));
        // A fresh drag starts with an open window
        assert_eq!(throttle.offer("a", Position::new(1.0, 1.0), t0 + Duration::from_millis(3)).len(), 1);
    }
}
