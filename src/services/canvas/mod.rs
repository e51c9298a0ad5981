//! The canvas engine: one owned instance per canvas session.
//!
//! Every mutation is a `&mut self` method on [`CanvasEngine`] and either
//! applies completely or returns an error having changed nothing. Reads take
//! `&self`. Mutations that change persisted state end in `mark_changed`,
//! which stamps `last_modified` and hands a fresh snapshot to the debounced
//! [`PersistenceScheduler`] when one is attached.
//!
//! The operations are split by concern:
//! - `viewport`: pan and zoom
//! - `selection`: rectangle / lasso hit-testing
//! - `sections`: sections and auto-collection
//! - `positions`: node coordinates, drag throttling, orphan pruning
//! - `connections`: task connections and the dependency graph
//! - `persistence`: hydration, snapshots, session teardown

mod connections;
mod persistence;
mod positions;
mod sections;
mod selection;
mod viewport;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::drag_throttle::DragThrottle;
use super::persistence::PersistenceScheduler;
use super::spatial_index::SpatialIndex;
use super::task_store::TaskStore;
use crate::config::CanvasConfig;
use crate::domain::canvas_state::{CanvasSettings, CanvasState, CanvasStateDocument};
use crate::domain::connection::ConnectionSet;
use crate::domain::geometry::Position;
use crate::domain::section::{CanvasSection, SectionId};
use crate::domain::selection::SelectionState;
use crate::domain::task::TaskId;
use crate::domain::validation::SectionValidator;
use crate::domain::viewport::Viewport;
use crate::utils::clock::{Clock, SystemClock};

pub use persistence::HydrationReport;
pub use sections::AutoAssignOutcome;

pub struct CanvasEngine {
    state: CanvasState,
    index: SpatialIndex,
    throttle: DragThrottle,
    validator: SectionValidator,
    config: CanvasConfig,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    persistence: Option<PersistenceScheduler>,
    last_modified: Option<DateTime<Utc>>,
}

impl CanvasEngine {
    pub fn new(tasks: Arc<dyn TaskStore>, config: CanvasConfig) -> Self {
        Self {
            state: CanvasState::default(),
            index: SpatialIndex::new(config.node_size()),
            throttle: DragThrottle::new(config.drag_throttle()),
            validator: SectionValidator::new(config.coordinate_limit),
            config,
            tasks,
            clock: Arc::new(SystemClock),
            persistence: None,
            last_modified: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a debounced snapshot writer. Mutations then require a tokio runtime.
    pub fn with_persistence(mut self, scheduler: PersistenceScheduler) -> Self {
        self.persistence = Some(scheduler);
        self
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn sections(&self) -> &[CanvasSection] {
        &self.state.sections
    }

    pub fn section(&self, id: &SectionId) -> Option<&CanvasSection> {
        self.state.section(id)
    }

    pub fn task_positions(&self) -> &BTreeMap<TaskId, Position> {
        &self.state.task_positions
    }

    pub fn task_position(&self, task_id: &str) -> Option<Position> {
        self.state.task_positions.get(task_id).copied()
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.state.connections
    }

    pub fn section_assignments(&self) -> &BTreeMap<TaskId, SectionId> {
        &self.state.section_assignments
    }

    pub fn selection(&self) -> &SelectionState {
        &self.state.selection
    }

    pub fn settings(&self) -> CanvasSettings {
        self.state.settings
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Current persisted view of the state.
    pub fn snapshot(&self) -> CanvasStateDocument {
        self.state
            .to_document(self.last_modified.unwrap_or_else(Utc::now))
    }

    fn mark_changed(&mut self) {
        self.last_modified = Some(Utc::now());
        self.schedule_save();
    }

    fn schedule_save(&mut self) {
        if self.persistence.is_some() {
            let document = self.snapshot();
            if let Some(scheduler) = self.persistence.as_mut() {
                scheduler.schedule(document);
            }
        }
    }
}
