use parking_lot::RwLock;
use std::collections::HashSet;

use crate::domain::task::{Task, TaskId};

/// Read-only access to the task store that owns task content.
///
/// The canvas only ever holds task ids; everything else is resolved here at
/// the moment it is needed.
#[cfg_attr(test, mockall::automock)]
pub trait TaskStore: Send + Sync {
    fn list_tasks(&self) -> Vec<Task>;

    fn task_ids(&self) -> HashSet<TaskId> {
        self.list_tasks().into_iter().map(|t| t.id).collect()
    }

    fn contains(&self, task_id: &str) -> bool {
        self.task_ids().contains(task_id)
    }
}

/// Task store backed by a vector, for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    pub fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write();
        tasks.retain(|t| t.id != task.id);
        tasks.push(task);
    }

    pub fn remove(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        tasks.len() != before
    }
}

impl TaskStore for InMemoryTaskStore {
    fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    fn task_ids(&self) -> HashSet<TaskId> {
        self.tasks.read().iter().map(|t| t.id.clone()).collect()
    }

    fn contains(&self, task_id: &str) -> bool {
        self.tasks.read().iter().any(|t| t.id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_and_remove() {
        let store = InMemoryTaskStore::new(vec![Task::new("a", "A")]);
        store.insert(Task::new("a", "A renamed"));
        store.insert(Task::new("b", "B"));
        assert_eq!(store.list_tasks().len(), 2);
        assert!(store.contains("b"));

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.task_ids(), HashSet::from(["b".to_string()]));
    }
}
