use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::CanvasStore;
use crate::domain::canvas_state::CanvasStateDocument;

/// In-memory store with switchable write failures, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCanvasStore {
    document: Mutex<Option<CanvasStateDocument>>,
    fail_writes: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryCanvasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: CanvasStateDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Default::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn document(&self) -> Option<CanvasStateDocument> {
        self.document.lock().clone()
    }
}

#[async_trait]
impl CanvasStore for MemoryCanvasStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Option<CanvasStateDocument>> {
        Ok(self.document.lock().clone())
    }

    async fn save(&self, document: &CanvasStateDocument) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        *self.document.lock() = Some(document.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
