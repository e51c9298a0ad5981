use std::collections::HashSet;
use tracing::{info, instrument};

use super::CanvasEngine;
use crate::domain::connection::{ConnectionId, ConnectionType, TaskConnection};
use crate::domain::task::TaskId;
use crate::services::error_handling::{log_rejection, CanvasError};

impl CanvasEngine {
    /// Add a connection between two existing tasks. Self-loops, duplicate
    /// (from, to, type) triples and dependency cycles are rejected.
    #[instrument(skip(self))]
    pub fn create_connection(
        &mut self,
        from: &str,
        to: &str,
        connection_type: ConnectionType,
    ) -> Result<TaskConnection, CanvasError> {
        for id in [from, to] {
            if !self.tasks.contains(id) {
                let err = CanvasError::TaskNotFound { id: id.to_string() };
                log_rejection("create_connection", &err);
                return Err(err);
            }
        }
        let connection = match self.state.connections.create(from, to, connection_type) {
            Ok(c) => c.clone(),
            Err(e) => {
                let err = CanvasError::from(e);
                log_rejection("create_connection", &err);
                return Err(err);
            }
        };
        info!(connection_id = %connection.id, "Connection created");
        self.mark_changed();
        Ok(connection)
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> bool {
        let removed = self.state.connections.remove(id).is_some();
        if removed {
            self.mark_changed();
        }
        removed
    }

    /// Remove connections with an endpoint missing from the task store.
    pub fn cleanup_orphaned_connections(&mut self) -> Vec<TaskConnection> {
        let live = self.tasks.task_ids();
        let removed = self.state.connections.retain_endpoints(&live);
        if !removed.is_empty() {
            info!(count = removed.len(), "Pruned orphaned connections");
            self.mark_changed();
        }
        removed
    }

    pub fn connections_for_task(&self, task_id: &str) -> Vec<&TaskConnection> {
        self.state.connections.for_task(task_id)
    }

    /// Tasks `task_id` depends on.
    pub fn dependencies_of(&self, task_id: &str) -> Vec<TaskId> {
        self.state
            .connections
            .dependency_graph()
            .predecessors(task_id)
    }

    /// Tasks depending on `task_id`.
    pub fn dependents_of(&self, task_id: &str) -> Vec<TaskId> {
        self.state
            .connections
            .dependency_graph()
            .successors(task_id)
    }

    /// Topological order of the dependency edges.
    pub fn dependency_order(&self) -> Result<Vec<TaskId>, String> {
        self.state.connections.dependency_graph().topological_sort()
    }

    /// True when every dependency of `task_id` is complete. Tasks missing from
    /// the store count as complete.
    pub fn can_start_task(&self, task_id: &str) -> bool {
        let tasks = self.tasks.list_tasks();
        let live: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let completed: HashSet<TaskId> = self
            .dependencies_of(task_id)
            .into_iter()
            .filter(|dep| {
                !live.contains(dep.as_str())
                    || tasks.iter().any(|t| &t.id == dep && t.is_complete())
            })
            .collect();
        self.state
            .connections
            .dependency_graph()
            .can_start_task(task_id, &completed)
    }
}
