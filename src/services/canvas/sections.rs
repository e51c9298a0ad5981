use tracing::{debug, info, instrument};

use super::CanvasEngine;
use crate::domain::geometry::{Point, Position};
use crate::domain::section::{CanvasSection, NewSection, SectionId, SectionPatch, SectionType};
use crate::domain::task::{Task, TaskId};
use crate::services::error_handling::{log_rejection, CanvasError};

/// Result of one auto-collection pass over a section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoAssignOutcome {
    /// Tasks newly assigned to the section, in task store order.
    pub collected: Vec<TaskId>,
    /// Tasks that were in the section but now belong elsewhere or match nothing.
    pub released: Vec<TaskId>,
}

impl CanvasEngine {
    fn section_mut(&mut self, id: &SectionId) -> Result<&mut CanvasSection, CanvasError> {
        self.state
            .sections
            .iter_mut()
            .find(|s| s.id == *id)
            .ok_or(CanvasError::SectionNotFound { id: *id })
    }

    #[instrument(skip(self, data), fields(name = %data.name))]
    pub fn create_section(&mut self, data: NewSection) -> Result<CanvasSection, CanvasError> {
        let report = self.validator.validate_new(&data);
        if let Err(report) = report.into_result() {
            let err = CanvasError::from(report);
            log_rejection("create_section", &err);
            return Err(err);
        }
        let section = CanvasSection::new(data);
        info!(section_id = %section.id, section_type = ?section.section_type, "Section created");
        self.state.sections.push(section.clone());
        self.mark_changed();
        Ok(section)
    }

    pub fn update_section(&mut self, id: &SectionId, patch: SectionPatch) -> Result<CanvasSection, CanvasError> {
        let current = self
            .state
            .section(id)
            .ok_or(CanvasError::SectionNotFound { id: *id })?;
        if let Err(report) = self.validator.validate_patch(current, &patch).into_result() {
            let err = CanvasError::from(report);
            log_rejection("update_section", &err);
            return Err(err);
        }

        let section = self.section_mut(id)?;
        if let Some(name) = patch.name {
            section.name = name.trim().to_string();
        }
        if let Some(section_type) = patch.section_type {
            section.section_type = section_type;
        }
        if let Some(value) = patch.property_value {
            section.property_value = Some(value.trim().to_string());
        }
        if section.section_type == SectionType::Custom {
            section.property_value = None;
        }
        if let Some(position) = patch.position {
            section.position = position;
        }
        if let Some(size) = patch.size {
            section.size = size;
        }
        if let Some(color) = patch.color {
            section.color = color;
        }
        if let Some(visible) = patch.is_visible {
            section.is_visible = visible;
        }
        let updated = section.clone();
        self.mark_changed();
        Ok(updated)
    }

    /// Tasks from the store currently assigned to `id`, in store order.
    pub fn tasks_in_section(&self, id: &SectionId) -> Vec<Task> {
        self.tasks
            .list_tasks()
            .into_iter()
            .filter(|t| self.state.section_assignments.get(&t.id) == Some(id))
            .collect()
    }

    /// Remove an empty section. Sections holding tasks are left untouched.
    pub fn delete_section(&mut self, id: &SectionId) -> Result<CanvasSection, CanvasError> {
        let index = self
            .state
            .section_index(id)
            .ok_or(CanvasError::SectionNotFound { id: *id })?;
        let task_count = self.tasks_in_section(id).len();
        if task_count > 0 {
            let err = CanvasError::SectionNotEmpty { id: *id, task_count };
            log_rejection("delete_section", &err);
            return Err(err);
        }
        let removed = self.state.sections.remove(index);
        // Only stale assignments (tasks gone from the store) can still point here.
        self.state.section_assignments.retain(|_, s| s != id);
        info!(section_id = %id, "Section deleted");
        self.mark_changed();
        Ok(removed)
    }

    /// Id of the first filtered section matching `task`.
    fn first_matching_section(&self, task: &Task) -> Option<SectionId> {
        self.state
            .sections
            .iter()
            .find(|s| s.matches(task))
            .map(|s| s.id)
    }

    fn is_custom_assignment(&self, task_id: &str) -> bool {
        self.state
            .section_assignments
            .get(task_id)
            .and_then(|sid| self.state.section(sid))
            .is_some_and(|s| s.section_type == SectionType::Custom)
    }

    /// Run auto-collection for one section. A task goes to the first section
    /// whose filter matches it; manual placements in custom sections are kept.
    #[instrument(skip(self))]
    pub fn auto_assign_tasks(&mut self, section_id: &SectionId) -> Result<AutoAssignOutcome, CanvasError> {
        let section = self
            .state
            .section(section_id)
            .ok_or(CanvasError::SectionNotFound { id: *section_id })?;
        if section.section_type == SectionType::Custom {
            return Ok(AutoAssignOutcome::default());
        }

        let mut outcome = AutoAssignOutcome::default();
        for task in self.tasks.list_tasks() {
            if self.is_custom_assignment(&task.id) {
                continue;
            }
            let winner = self.first_matching_section(&task);
            let current = self.state.section_assignments.get(&task.id).copied();
            match (winner == Some(*section_id), current == Some(*section_id)) {
                (true, false) => outcome.collected.push(task.id),
                (false, true) => outcome.released.push(task.id),
                _ => {}
            }
        }

        if outcome.collected.is_empty() && outcome.released.is_empty() {
            return Ok(outcome);
        }
        for task_id in &outcome.released {
            self.state.section_assignments.remove(task_id);
        }
        let existing = self
            .state
            .section_assignments
            .values()
            .filter(|s| *s == section_id)
            .count();
        for task_id in &outcome.collected {
            self.state
                .section_assignments
                .insert(task_id.clone(), *section_id);
        }
        self.layout_in_section(section_id, &outcome.collected, existing);

        info!(
            collected = outcome.collected.len(),
            released = outcome.released.len(),
            "Auto-assigned tasks"
        );
        self.mark_changed();
        Ok(outcome)
    }

    /// Auto-collect into every filtered section, in precedence order.
    pub fn auto_assign_all(&mut self) -> Vec<(SectionId, AutoAssignOutcome)> {
        let ids: Vec<SectionId> = self
            .state
            .sections
            .iter()
            .filter(|s| s.section_type != SectionType::Custom)
            .map(|s| s.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.auto_assign_tasks(&id).ok().map(|o| (id, o)))
            .collect()
    }

    /// Place `task_ids` in grid slots starting after the `first_slot` already occupied.
    fn layout_in_section(&mut self, section_id: &SectionId, task_ids: &[TaskId], first_slot: usize) {
        let Some(section) = self.state.section(section_id) else {
            return;
        };
        let node = self.config.node_size();
        let pad = self.config.section_padding;
        let header = self.config.collapsed_section_height;
        let origin = section.position;
        let width = section.size.width;

        let columns = (((width - pad) / (node.width + pad)).floor() as usize).max(1);
        let limit = self.config.coordinate_limit;
        for (i, task_id) in task_ids.iter().enumerate() {
            let slot = first_slot + i;
            let (row, col) = (slot / columns, slot % columns);
            let position = Position::new(
                origin.x + pad + col as f64 * (node.width + pad),
                origin.y + header + pad + row as f64 * (node.height + pad),
            );
            if !position.is_within(limit) {
                debug!(task_id = %task_id, "Grid slot outside canvas bounds; keeping position");
                continue;
            }
            self.state
                .task_positions
                .insert(task_id.clone(), position);
            self.index.upsert(task_id, position);
        }
    }

    /// Manually place a task into a section, e.g. on drop into a custom section.
    pub fn assign_task_to_section(&mut self, task_id: &str, section_id: &SectionId) -> Result<(), CanvasError> {
        if !self.tasks.contains(task_id) {
            return Err(CanvasError::TaskNotFound {
                id: task_id.to_string(),
            });
        }
        if self.state.section(section_id).is_none() {
            return Err(CanvasError::SectionNotFound { id: *section_id });
        }
        self.state
            .section_assignments
            .insert(task_id.to_string(), *section_id);
        self.mark_changed();
        Ok(())
    }

    pub fn unassign_task(&mut self, task_id: &str) -> Option<SectionId> {
        let previous = self.state.section_assignments.remove(task_id);
        if previous.is_some() {
            self.mark_changed();
        }
        previous
    }

    /// Collapse or expand. Returns whether the section is now collapsed.
    pub fn toggle_section_collapsed(
        &mut self,
        id: &SectionId,
        collapsed_height: Option<f64>,
    ) -> Result<bool, CanvasError> {
        let header = self.config.collapsed_section_height;
        let section = self.section_mut(id)?;
        if section.is_collapsed {
            section.size.height = section.collapsed_height.take().unwrap_or(section.size.height);
            section.is_collapsed = false;
        } else {
            let stored = collapsed_height
                .filter(|h| h.is_finite() && *h > 0.0)
                .unwrap_or(section.size.height);
            section.collapsed_height = Some(stored);
            section.size.height = header;
            section.is_collapsed = true;
        }
        let collapsed = section.is_collapsed;
        debug!(section_id = %id, collapsed, "Section collapse toggled");
        self.mark_changed();
        Ok(collapsed)
    }

    /// Move a section to `new_index` (clamped), changing auto-collection precedence.
    pub fn reorder_section(&mut self, id: &SectionId, new_index: usize) -> Result<(), CanvasError> {
        let from = self
            .state
            .section_index(id)
            .ok_or(CanvasError::SectionNotFound { id: *id })?;
        let to = new_index.min(self.state.sections.len() - 1);
        if from != to {
            let section = self.state.sections.remove(from);
            self.state.sections.insert(to, section);
            self.mark_changed();
        }
        Ok(())
    }

    /// Topmost visible section containing a world point.
    pub fn section_at(&self, point: Point) -> Option<&CanvasSection> {
        self.state
            .sections
            .iter()
            .rev()
            .find(|s| s.is_visible && s.contains(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasConfig;
    use crate::domain::geometry::Size;
    use crate::domain::section::SectionRect;
    use crate::domain::task::{Priority, TaskStatus};
    use crate::services::task_store::InMemoryTaskStore;
    use std::sync::Arc;

    fn new_section(name: &str, section_type: SectionType, value: Option<&str>) -> NewSection {
        NewSection {
            name: name.to_string(),
            section_type,
            position: SectionRect {
                x: 0.0,
                y: 0.0,
                width: 700.0,
                height: 400.0,
            },
            color: "#3b82f6".to_string(),
            property_value: value.map(str::to_string),
        }
    }

    fn engine_with(tasks: Vec<Task>) -> (CanvasEngine, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new(tasks));
        (CanvasEngine::new(store.clone(), CanvasConfig::default()), store)
    }

    #[test]
    fn test_invalid_section_is_not_added() {
        let (mut engine, _) = engine_with(vec![]);
        let mut data = new_section("  ", SectionType::Priority, None);
        data.position.width = 0.0;
        let err = engine.create_section(data).unwrap_err();
        let CanvasError::Validation(report) = err else {
            panic!("expected validation error");
        };
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 3);
        assert!(engine.sections().is_empty());
    }

    #[test]
    fn test_update_unknown_section() {
        let (mut engine, _) = engine_with(vec![]);
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            engine.update_section(&id, SectionPatch::default()),
            Err(CanvasError::SectionNotFound { id })
        );
    }

    #[test]
    fn test_update_validates_resulting_filter() {
        let (mut engine, _) = engine_with(vec![]);
        let section = engine
            .create_section(new_section("Board", SectionType::Custom, None))
            .unwrap();
        let patch = SectionPatch {
            section_type: Some(SectionType::Status),
            ..Default::default()
        };
        assert!(engine.update_section(&section.id, patch).is_err());

        let patch = SectionPatch {
            section_type: Some(SectionType::Status),
            property_value: Some("blocked".to_string()),
            name: Some(" Blocked ".to_string()),
            ..Default::default()
        };
        let updated = engine.update_section(&section.id, patch).unwrap();
        assert_eq!(updated.name, "Blocked");
        assert_eq!(updated.property_value.as_deref(), Some("blocked"));
    }

    #[test]
    fn test_first_match_wins_and_lays_out_grid() {
        let (mut engine, _) = engine_with(vec![
            Task::new("t1", "one").with_priority(Priority::High).with_status(TaskStatus::Blocked),
            Task::new("t2", "two").with_priority(Priority::High),
            Task::new("t3", "three").with_status(TaskStatus::Blocked),
        ]);
        let high = engine
            .create_section(new_section("High", SectionType::Priority, Some("high")))
            .unwrap();
        let blocked = engine
            .create_section(new_section("Blocked", SectionType::Status, Some("blocked")))
            .unwrap();

        let outcome = engine.auto_assign_tasks(&blocked.id).unwrap();
        assert_eq!(outcome.collected, vec!["t3".to_string()]);

        let outcome = engine.auto_assign_tasks(&high.id).unwrap();
        assert_eq!(outcome.collected, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(engine.task_position("t1"), Some(Position::new(20.0, 60.0)));
        assert_eq!(engine.task_position("t2"), Some(Position::new(240.0, 60.0)));
    }

    #[test]
    fn test_reorder_changes_precedence() {
        let (mut engine, _) = engine_with(vec![Task::new("t1", "one")
            .with_priority(Priority::High)
            .with_status(TaskStatus::Blocked)]);
        let high = engine
            .create_section(new_section("High", SectionType::Priority, Some("high")))
            .unwrap();
        let blocked = engine
            .create_section(new_section("Blocked", SectionType::Status, Some("blocked")))
            .unwrap();
        engine.auto_assign_all();
        assert_eq!(engine.section_assignments().get("t1"), Some(&high.id));

        engine.reorder_section(&blocked.id, 0).unwrap();
        let results = engine.auto_assign_all();
        assert_eq!(results[0].1.collected, vec!["t1".to_string()]);
        assert_eq!(engine.section_assignments().get("t1"), Some(&blocked.id));
        assert_eq!(engine.tasks_in_section(&high.id).len(), 0);
    }

    #[test]
    fn test_changed_task_is_released() {
        let (mut engine, store) = engine_with(vec![Task::new("t1", "one").with_status(TaskStatus::Blocked)]);
        let blocked = engine
            .create_section(new_section("Blocked", SectionType::Status, Some("blocked")))
            .unwrap();
        engine.auto_assign_tasks(&blocked.id).unwrap();

        store.insert(Task::new("t1", "one").with_status(TaskStatus::Done));
        let outcome = engine.auto_assign_tasks(&blocked.id).unwrap();
        assert_eq!(outcome.released, vec!["t1".to_string()]);
        assert!(engine.section_assignments().is_empty());
    }

    #[test]
    fn test_custom_section_keeps_manual_placement() {
        let (mut engine, _) = engine_with(vec![Task::new("t1", "one").with_priority(Priority::High)]);
        let custom = engine
            .create_section(new_section("Mine", SectionType::Custom, None))
            .unwrap();
        let high = engine
            .create_section(new_section("High", SectionType::Priority, Some("high")))
            .unwrap();
        assert!(engine.auto_assign_tasks(&custom.id).unwrap().collected.is_empty());

        engine.assign_task_to_section("t1", &custom.id).unwrap();
        assert!(engine.auto_assign_tasks(&high.id).unwrap().collected.is_empty());
        assert_eq!(engine.section_assignments().get("t1"), Some(&custom.id));
        assert!(engine.assign_task_to_section("ghost", &custom.id).is_err());
    }

    #[test]
    fn test_delete_non_empty_section_is_rejected() {
        let (mut engine, store) = engine_with(vec![Task::new("t1", "one")]);
        let section = engine
            .create_section(new_section("Mine", SectionType::Custom, None))
            .unwrap();
        engine.assign_task_to_section("t1", &section.id).unwrap();

        let err = engine.delete_section(&section.id).unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete section containing tasks");
        assert_eq!(engine.sections().len(), 1);

        // A task that vanished from the store no longer counts.
        store.remove("t1");
        assert!(engine.delete_section(&section.id).is_ok());
        assert!(engine.sections().is_empty());
        assert!(engine.section_assignments().is_empty());
    }

    #[test]
    fn test_collapse_round_trip() {
        let (mut engine, _) = engine_with(vec![]);
        let section = engine
            .create_section(new_section("S", SectionType::Custom, None))
            .unwrap();

        assert!(engine.toggle_section_collapsed(&section.id, Some(350.0)).unwrap());
        let collapsed = engine.section(&section.id).unwrap();
        assert_eq!(collapsed.size, Size::new(700.0, 40.0));
        assert_eq!(collapsed.collapsed_height, Some(350.0));

        assert!(!engine.toggle_section_collapsed(&section.id, None).unwrap());
        let expanded = engine.section(&section.id).unwrap();
        assert_eq!(expanded.size.height, 350.0);
        assert_eq!(expanded.collapsed_height, None);
    }

    #[test]
    fn test_section_at_prefers_topmost_visible() {
        let (mut engine, _) = engine_with(vec![]);
        let below = engine
            .create_section(new_section("Below", SectionType::Custom, None))
            .unwrap();
        let above = engine
            .create_section(new_section("Above", SectionType::Custom, None))
            .unwrap();
        assert_eq!(engine.section_at(Point::new(10.0, 10.0)).map(|s| s.id), Some(above.id));

        engine
            .update_section(
                &above.id,
                SectionPatch {
                    is_visible: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(engine.section_at(Point::new(10.0, 10.0)).map(|s| s.id), Some(below.id));
        assert!(engine.section_at(Point::new(-1.0, 10.0)).is_none());
    }
}
