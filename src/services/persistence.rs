use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error_handling::SnapshotError;
use crate::domain::canvas_state::{CanvasStateDocument, DOCUMENT_VERSION};
use crate::repository::CanvasStore;

/// Observable state of the save pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceStatus {
    Idle,
    /// A snapshot is waiting for the debounce window to pass.
    Pending,
    Saving,
    Saved { at: DateTime<Utc> },
    Failed { error: String },
}

/// Which side won a last-writer-wins comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSnapshot {
    pub document: CanvasStateDocument,
    pub source: SnapshotSource,
}

/// Whole-document last-writer-wins. Ties keep the local copy.
pub fn resolve_conflict(
    local: Option<CanvasStateDocument>,
    remote: Option<CanvasStateDocument>,
) -> Option<ResolvedSnapshot> {
    match (local, remote) {
        (None, None) => None,
        (Some(document), None) => Some(ResolvedSnapshot {
            document,
            source: SnapshotSource::Local,
        }),
        (None, Some(document)) => Some(ResolvedSnapshot {
            document,
            source: SnapshotSource::Remote,
        }),
        (Some(local), Some(remote)) => {
            if remote.last_modified > local.last_modified {
                info!(
                    local = %local.last_modified,
                    remote = %remote.last_modified,
                    "Remote canvas snapshot is newer; replacing local"
                );
                Some(ResolvedSnapshot {
                    document: remote,
                    source: SnapshotSource::Remote,
                })
            } else {
                Some(ResolvedSnapshot {
                    document: local,
                    source: SnapshotSource::Local,
                })
            }
        }
    }
}

async fn load_compatible(store: &dyn CanvasStore) -> Result<Option<CanvasStateDocument>, SnapshotError> {
    let document = store.load().await.map_err(|source| SnapshotError::Store {
        store: store.name().to_string(),
        source,
    })?;
    match document {
        Some(doc) if !doc.is_compatible() => Err(SnapshotError::IncompatibleVersion {
            found: doc.version,
            expected: DOCUMENT_VERSION.to_string(),
        }),
        other => Ok(other),
    }
}

/// Load both sides and pick the newer one.
///
/// A side that fails to load is logged and treated as absent, as long as the
/// other side loads; if both fail, the local error is returned.
pub async fn load_latest(
    local: &dyn CanvasStore,
    remote: Option<&dyn CanvasStore>,
) -> Result<Option<ResolvedSnapshot>, SnapshotError> {
    let local_result = load_compatible(local).await;
    let remote_result = match remote {
        Some(store) => load_compatible(store).await,
        None => Ok(None),
    };

    match (local_result, remote_result) {
        (Ok(l), Ok(r)) => Ok(resolve_conflict(l, r)),
        (Ok(l), Err(e)) => {
            warn!(error = %e, "Ignoring unreadable remote canvas snapshot");
            Ok(resolve_conflict(l, None))
        }
        (Err(e), Ok(r)) if remote.is_some() => {
            warn!(error = %e, "Ignoring unreadable local canvas snapshot");
            Ok(resolve_conflict(None, r))
        }
        (Err(e), _) => Err(e),
    }
}

struct Shared {
    stores: Vec<Arc<dyn CanvasStore>>,
    status: watch::Sender<PersistenceStatus>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    async fn write(&self, document: &CanvasStateDocument) -> Result<(), String> {
        self.status.send_replace(PersistenceStatus::Saving);
        for store in &self.stores {
            if let Err(e) = store.save(document).await {
                let message = format!("{} store: {:#}", store.name(), e);
                error!(store = store.name(), error = %message, "Canvas snapshot save failed");
                *self.last_error.lock() = Some(message.clone());
                self.status.send_replace(PersistenceStatus::Failed {
                    error: message.clone(),
                });
                return Err(message);
            }
        }
        *self.last_error.lock() = None;
        self.status.send_replace(PersistenceStatus::Saved { at: Utc::now() });
        debug!(last_modified = %document.last_modified, "Canvas snapshot saved");
        Ok(())
    }
}

/// Debounced snapshot writer owned by the engine.
///
/// Each `schedule` call replaces the pending snapshot and restarts the
/// window. The pending task's `JoinHandle` is the cancellation handle.
pub struct PersistenceScheduler {
    shared: Arc<Shared>,
    debounce: Duration,
    pending: Option<JoinHandle<()>>,
}

impl PersistenceScheduler {
    pub fn new(stores: Vec<Arc<dyn CanvasStore>>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(PersistenceStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                stores,
                status,
                last_error: Mutex::new(None),
            }),
            debounce,
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PersistenceStatus> {
        self.shared.status.subscribe()
    }

    pub fn status(&self) -> PersistenceStatus {
        self.shared.status.borrow().clone()
    }

    /// Most recent save error; cleared by the next successful save.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    fn abort_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let live = !handle.is_finished();
                handle.abort();
                live
            }
            None => false,
        }
    }

    /// Replace any pending snapshot with `document`. Must be called inside a tokio runtime.
    pub fn schedule(&mut self, document: CanvasStateDocument) {
        self.abort_pending();
        self.shared.status.send_replace(PersistenceStatus::Pending);

        let shared = Arc::clone(&self.shared);
        let debounce = self.debounce;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Failure is already recorded on the shared status.
            let _ = shared.write(&document).await;
        }));
    }

    /// Write `document` now, superseding anything pending.
    pub async fn flush(&mut self, document: CanvasStateDocument) -> Result<(), String> {
        self.abort_pending();
        self.shared.write(&document).await
    }

    /// Drop the pending snapshot without writing it.
    pub fn cancel(&mut self) {
        if self.abort_pending() {
            info!("Pending canvas snapshot cancelled");
            self.shared.status.send_if_modified(|status| {
                if matches!(status, PersistenceStatus::Pending | PersistenceStatus::Saving) {
                    *status = PersistenceStatus::Idle;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl Drop for PersistenceScheduler {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canvas_state::CanvasState;
    use crate::repository::MemoryCanvasStore;
    use chrono::TimeZone;

    fn doc_at(secs: i64) -> CanvasStateDocument {
        CanvasState::default().to_document(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn test_resolve_prefers_newer() {
        let resolved = resolve_conflict(Some(doc_at(100)), Some(doc_at(200))).unwrap();
        assert_eq!(resolved.source, SnapshotSource::Remote);

        let resolved = resolve_conflict(Some(doc_at(300)), Some(doc_at(200))).unwrap();
        assert_eq!(resolved.source, SnapshotSource::Local);
    }

    #[test]
    fn test_resolve_tie_keeps_local() {
        let resolved = resolve_conflict(Some(doc_at(100)), Some(doc_at(100))).unwrap();
        assert_eq!(resolved.source, SnapshotSource::Local);
        assert!(resolve_conflict(None, None).is_none());
    }

    #[tokio::test]
    async fn test_load_latest_skips_incompatible_remote() {
        let local = MemoryCanvasStore::with_document(doc_at(100));
        let mut future = doc_at(500);
        future.version = "9.0".to_string();
        let remote = MemoryCanvasStore::with_document(future);

        let resolved = load_latest(&local, Some(&remote as &dyn CanvasStore)).await.unwrap().unwrap();
        assert_eq!(resolved.source, SnapshotSource::Local);
    }

    #[tokio::test]
    async fn test_load_latest_errors_when_only_side_is_incompatible() {
        let mut old = doc_at(100);
        old.version = "0.3".to_string();
        let local = MemoryCanvasStore::with_document(old);
        let err = load_latest(&local, None).await.unwrap_err();
        assert!(matches!(err, SnapshotError::IncompatibleVersion { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_debounces_to_latest() {
        let store = Arc::new(MemoryCanvasStore::new());
        let mut scheduler = PersistenceScheduler::new(vec![store.clone() as Arc<dyn CanvasStore>], Duration::from_millis(2000));

        scheduler.schedule(doc_at(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.schedule(doc_at(2));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.save_count(), 0);
        assert_eq!(scheduler.status(), PersistenceStatus::Pending);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.document().unwrap().last_modified, doc_at(2).last_modified);
        assert!(matches!(scheduler.status(), PersistenceStatus::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_write() {
        let store = Arc::new(MemoryCanvasStore::new());
        let mut scheduler = PersistenceScheduler::new(vec![store.clone() as Arc<dyn CanvasStore>], Duration::from_millis(2000));

        scheduler.schedule(doc_at(1));
        scheduler.cancel();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(store.save_count(), 0);
        assert_eq!(scheduler.status(), PersistenceStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_recorded_then_cleared() {
        let store = Arc::new(MemoryCanvasStore::new());
        let mut scheduler = PersistenceScheduler::new(vec![store.clone() as Arc<dyn CanvasStore>], Duration::from_millis(100));
        let mut status = scheduler.subscribe();

        store.set_fail_writes(true);
        scheduler.schedule(doc_at(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.last_error().unwrap().contains("simulated write failure"));
        assert!(matches!(*status.borrow_and_update(), PersistenceStatus::Failed { .. }));

        store.set_fail_writes(false);
        scheduler.schedule(doc_at(2));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scheduler.last_error().is_none());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_flush_writes_immediately() {
        let store = Arc::new(MemoryCanvasStore::new());
        let mut scheduler = PersistenceScheduler::new(vec![store.clone() as Arc<dyn CanvasStore>], Duration::from_secs(60));
        scheduler.schedule(doc_at(1));
        scheduler.flush(doc_at(2)).await.unwrap();
        assert_eq!(store.save_count(), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.save_count(), 1);
        assert!(matches!(scheduler.status(), PersistenceStatus::Saved { .. }));
    }
}
