pub mod canvas_snapshot_repository;
pub mod database;
pub mod json_file_store;
pub mod memory_store;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::canvas_state::CanvasStateDocument;

pub use canvas_snapshot_repository::CanvasSnapshotRepository;
pub use json_file_store::JsonFileStore;
pub use memory_store::MemoryCanvasStore;

/// Somewhere a canvas snapshot can be read from and written to.
#[async_trait]
pub trait CanvasStore: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    /// The stored snapshot, or `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<CanvasStateDocument>>;

    async fn save(&self, document: &CanvasStateDocument) -> Result<()>;
}
