pub mod canvas;
pub mod drag_throttle;
pub mod error_handling;
pub mod persistence;
pub mod spatial_index;
pub mod task_store;

pub use canvas::{AutoAssignOutcome, CanvasEngine, HydrationReport};
pub use error_handling::{CanvasError, SnapshotError, UserErrorFormatter};
pub use persistence::{PersistenceScheduler, PersistenceStatus, SnapshotSource};
pub use task_store::{InMemoryTaskStore, TaskStore};
