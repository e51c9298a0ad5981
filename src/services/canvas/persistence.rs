use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{info, warn};

use super::CanvasEngine;
use crate::domain::canvas_state::{CanvasSettings, CanvasState, CanvasStateDocument, DOCUMENT_VERSION};
use crate::domain::viewport::Viewport;
use crate::repository::CanvasStore;
use crate::services::error_handling::SnapshotError;
use crate::services::persistence::{load_latest, PersistenceStatus, SnapshotSource};

/// What sanitizing a loaded document threw away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationReport {
    pub zoom_clamped: bool,
    pub dropped_positions: usize,
    pub dropped_sections: usize,
    pub dropped_connections: usize,
    pub dropped_assignments: usize,
    pub orphaned_positions: usize,
    pub orphaned_connections: usize,
}

impl HydrationReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl CanvasEngine {
    fn sanitize_viewport(&self, viewport: Viewport, report: &mut HydrationReport) -> Viewport {
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        let zoom = finite_or(viewport.zoom, 1.0);
        let clamped = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        if clamped != viewport.zoom {
            warn!(zoom = viewport.zoom, clamped, "Loaded viewport zoom out of range");
            report.zoom_clamped = true;
        }
        Viewport {
            x: finite_or(viewport.x, 0.0),
            y: finite_or(viewport.y, 0.0),
            zoom: clamped,
        }
    }

    /// Replace the whole canvas state with a loaded document.
    ///
    /// Invalid entries are dropped with a warning rather than failing the load,
    /// then orphans are pruned against the task store. Only an incompatible
    /// document version is an error.
    pub fn hydrate(&mut self, document: CanvasStateDocument) -> Result<HydrationReport, SnapshotError> {
        if !document.is_compatible() {
            return Err(SnapshotError::IncompatibleVersion {
                found: document.version,
                expected: DOCUMENT_VERSION.to_string(),
            });
        }

        let mut report = HydrationReport::default();
        let mut state = CanvasState {
            viewport: self.sanitize_viewport(document.viewport, &mut report),
            ..Default::default()
        };

        let limit = self.config.coordinate_limit;
        for (task_id, position) in document.task_positions {
            if position.is_finite() && position.is_within(limit) {
                state.task_positions.insert(task_id, position);
            } else {
                warn!(task_id = %task_id, x = position.x, y = position.y, "Dropping invalid task position");
                report.dropped_positions += 1;
            }
        }

        let mut seen = HashSet::new();
        for section in document.sections {
            let checked = self.validator.validate_existing(&section);
            if !checked.is_valid || !seen.insert(section.id) {
                warn!(section_id = %section.id, reason = %checked, "Dropping invalid section");
                report.dropped_sections += 1;
                continue;
            }
            state.sections.push(section);
        }

        for connection in document.connections {
            let id = connection.id;
            if let Err(e) = state.connections.restore(connection) {
                warn!(connection_id = %id, error = %e, "Dropping invalid connection");
                report.dropped_connections += 1;
            }
        }

        for (task_id, section_id) in document.section_assignments {
            if seen.contains(&section_id) {
                state.section_assignments.insert(task_id, section_id);
            } else {
                report.dropped_assignments += 1;
            }
        }

        state.settings = document.settings;
        if !state.settings.has_valid_grid() {
            warn!(grid_size = state.settings.grid_size, "Resetting invalid grid size");
            state.settings.grid_size = CanvasSettings::default().grid_size;
        }

        self.state = state;
        self.throttle.reset();
        self.index.rebuild(&self.state.task_positions);
        self.last_modified = Some(document.last_modified);

        let live = self.tasks.task_ids();
        let (pruned, _) = self.prune_orphans(&live);
        report.orphaned_positions = pruned.len();
        report.orphaned_connections = self.state.connections.retain_endpoints(&live).len();

        if report.is_clean() {
            info!(
                sections = self.state.sections.len(),
                positions = self.state.task_positions.len(),
                connections = self.state.connections.len(),
                "Canvas state hydrated"
            );
        } else {
            warn!(?report, "Canvas state hydrated with corrections");
        }
        Ok(report)
    }

    /// Load the newer of the local and remote snapshots and hydrate from it.
    ///
    /// Cancels any pending save first so a stale write cannot land on top of
    /// the loaded state. A clean remote winner is written back through the
    /// attached stores with its original timestamp. A snapshot that needed
    /// corrections is stamped as a fresh change so the corrected copy wins
    /// later comparisons against the uncorrected one.
    pub async fn load(
        &mut self,
        local: &dyn CanvasStore,
        remote: Option<&dyn CanvasStore>,
    ) -> Result<Option<(SnapshotSource, HydrationReport)>, SnapshotError> {
        if let Some(scheduler) = self.persistence.as_mut() {
            scheduler.cancel();
        }
        let Some(resolved) = load_latest(local, remote).await? else {
            info!("No canvas snapshot found; starting empty");
            return Ok(None);
        };
        let report = self.hydrate(resolved.document)?;
        if !report.is_clean() {
            self.mark_changed();
        } else if resolved.source == SnapshotSource::Remote {
            self.schedule_save();
        }
        Ok(Some((resolved.source, report)))
    }

    /// Write the current snapshot now, replacing any pending debounced write.
    pub async fn flush(&mut self) -> Result<(), String> {
        let document = self.snapshot();
        match self.persistence.as_mut() {
            Some(scheduler) => scheduler.flush(document).await,
            None => Ok(()),
        }
    }

    /// Tear down the session: cancel the pending save without writing and
    /// drop any in-flight gesture.
    pub fn end_session(&mut self) {
        if let Some(scheduler) = self.persistence.as_mut() {
            scheduler.cancel();
        }
        self.throttle.reset();
        self.state.selection.reset_gesture();
        info!("Canvas session ended");
    }

    pub fn persistence_status(&self) -> PersistenceStatus {
        self.persistence
            .as_ref()
            .map(|s| s.status())
            .unwrap_or(PersistenceStatus::Idle)
    }

    pub fn subscribe_persistence(&self) -> Option<watch::Receiver<PersistenceStatus>> {
        self.persistence.as_ref().map(|s| s.subscribe())
    }

    pub fn last_save_error(&self) -> Option<String> {
        self.persistence.as_ref().and_then(|s| s.last_error())
    }
}
