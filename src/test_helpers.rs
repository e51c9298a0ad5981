// Test helpers for integration testing

use std::sync::Arc;

use crate::config::CanvasConfig;
use crate::domain::task::Task;
use crate::repository::{CanvasStore, MemoryCanvasStore};
use crate::services::{CanvasEngine, InMemoryTaskStore, PersistenceScheduler};
use crate::utils::clock::ManualClock;

pub struct TestContext {
    pub tasks: Arc<InMemoryTaskStore>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryCanvasStore>,
    pub engine: CanvasEngine,
}

impl TestContext {
    /// Engine over `task_ids` with a manual clock and no persistence.
    pub fn new_for_test(task_ids: &[&str]) -> Self {
        let tasks = task_ids.iter().map(|id| Task::new(*id, *id)).collect();
        Self::with_tasks(tasks)
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self::build(tasks, false)
    }

    /// Same, but saving into `self.store` through the debounced scheduler.
    /// Needs a tokio runtime.
    pub fn persistent(task_ids: &[&str]) -> Self {
        let tasks = task_ids.iter().map(|id| Task::new(*id, *id)).collect();
        Self::build(tasks, true)
    }

    fn build(tasks: Vec<Task>, persistent: bool) -> Self {
        let config = CanvasConfig::default();
        let tasks = Arc::new(InMemoryTaskStore::new(tasks));
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryCanvasStore::new());

        let mut engine = CanvasEngine::new(tasks.clone(), config.clone()).with_clock(clock.clone());
        if persistent {
            let scheduler = PersistenceScheduler::new(
                vec![store.clone() as Arc<dyn CanvasStore>],
                config.debounce(),
            );
            engine = engine.with_persistence(scheduler);
        }
        Self {
            tasks,
            clock,
            store,
            engine,
        }
    }
}
