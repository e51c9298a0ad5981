use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use super::dependency::DependencyGraph;
use super::task::TaskId;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Dependency,
    Sequential,
    Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskConnection {
    pub id: ConnectionId,
    pub from_task_id: TaskId,
    pub to_task_id: TaskId,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("A task cannot be connected to itself: {task_id}")]
    SelfLoop { task_id: TaskId },

    #[error("Connection already exists: {from} -> {to} ({connection_type:?})")]
    Duplicate {
        from: TaskId,
        to: TaskId,
        connection_type: ConnectionType,
    },

    #[error("Circular dependency detected: {from} -> {to} would close a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("Connection id already in use: {id}")]
    DuplicateId { id: ConnectionId },
}

impl TaskConnection {
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>, connection_type: ConnectionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_task_id: from.into(),
            to_task_id: to.into(),
            connection_type,
            created_at: Utc::now(),
        }
    }

    pub fn touches(&self, task_id: &str) -> bool {
        self.from_task_id == task_id || self.to_task_id == task_id
    }
}

/// All connections of a canvas, in creation order, with the invariants enforced on insert:
/// no self-loops, no duplicate `(from, to, type)` triples, and an acyclic dependency subgraph.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSet {
    connections: IndexMap<ConnectionId, TaskConnection>,
    by_task: HashMap<TaskId, BTreeSet<ConnectionId>>,
    dependencies: DependencyGraph,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskConnection> {
        self.connections.values()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&TaskConnection> {
        self.connections.get(id)
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Check a prospective edge against every invariant without adding it.
    pub fn check(&self, from: &str, to: &str, connection_type: ConnectionType) -> Result<(), ConnectionError> {
        if from == to {
            return Err(ConnectionError::SelfLoop {
                task_id: from.to_string(),
            });
        }
        let duplicate = self.connections.values().any(|c| {
            c.from_task_id == from && c.to_task_id == to && c.connection_type == connection_type
        });
        if duplicate {
            return Err(ConnectionError::Duplicate {
                from: from.to_string(),
                to: to.to_string(),
                connection_type,
            });
        }
        if connection_type == ConnectionType::Dependency && self.dependencies.would_create_cycle(from, to) {
            return Err(ConnectionError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    pub fn create(
        &mut self,
        from: &str,
        to: &str,
        connection_type: ConnectionType,
    ) -> Result<&TaskConnection, ConnectionError> {
        self.check(from, to, connection_type)?;
        let connection = TaskConnection::new(from, to, connection_type);
        Ok(self.insert_unchecked(connection))
    }

    /// Re-insert a connection that already carries an id, e.g. from a loaded document.
    pub fn restore(&mut self, connection: TaskConnection) -> Result<&TaskConnection, ConnectionError> {
        if self.connections.contains_key(&connection.id) {
            return Err(ConnectionError::DuplicateId { id: connection.id });
        }
        self.check(
            &connection.from_task_id,
            &connection.to_task_id,
            connection.connection_type,
        )?;
        Ok(self.insert_unchecked(connection))
    }

    fn insert_unchecked(&mut self, connection: TaskConnection) -> &TaskConnection {
        let id = connection.id;
        if connection.connection_type == ConnectionType::Dependency {
            self.dependencies
                .insert_edge(&connection.from_task_id, &connection.to_task_id, id);
        }
        for endpoint in [&connection.from_task_id, &connection.to_task_id] {
            self.by_task.entry(endpoint.clone()).or_default().insert(id);
        }
        self.connections.entry(id).or_insert(connection)
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<TaskConnection> {
        let connection = self.connections.shift_remove(id)?;
        if connection.connection_type == ConnectionType::Dependency {
            self.dependencies
                .remove_edge(&connection.from_task_id, &connection.to_task_id, *id);
        }
        for endpoint in [&connection.from_task_id, &connection.to_task_id] {
            if let Some(ids) = self.by_task.get_mut(endpoint) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_task.remove(endpoint);
                }
            }
        }
        Some(connection)
    }

    /// Drop every connection with an endpoint outside `live_ids`. Returns the removed edges.
    pub fn retain_endpoints(&mut self, live_ids: &HashSet<TaskId>) -> Vec<TaskConnection> {
        let doomed: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| !live_ids.contains(&c.from_task_id) || !live_ids.contains(&c.to_task_id))
            .map(|c| c.id)
            .collect();
        doomed.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Connections with `task_id` at either end.
    pub fn for_task(&self, task_id: &str) -> Vec<&TaskConnection> {
        self.by_task
            .get(task_id)
            .map(|ids| ids.iter().filter_map(|id| self.connections.get(id)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_self_loop() {
        let mut set = ConnectionSet::new();
        let err = set.create("a", "a", ConnectionType::Reference).unwrap_err();
        assert!(matches!(err, ConnectionError::SelfLoop { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_triple_but_allows_other_types() {
        let mut set = ConnectionSet::new();
        set.create("a", "b", ConnectionType::Dependency).unwrap();
        assert!(matches!(
            set.create("a", "b", ConnectionType::Dependency),
            Err(ConnectionError::Duplicate { .. })
        ));
        set.create("a", "b", ConnectionType::Reference).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rejects_dependency_cycle() {
        let mut set = ConnectionSet::new();
        set.create("a", "b", ConnectionType::Dependency).unwrap();
        set.create("b", "c", ConnectionType::Dependency).unwrap();
        let err = set.create("c", "a", ConnectionType::Dependency).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::Cycle {
                from: "c".to_string(),
                to: "a".to_string()
            }
        );
        assert_eq!(set.len(), 2);
        assert!(!set.dependency_graph().has_cycle());
    }

    #[test]
    fn test_non_dependency_edges_may_form_cycles() {
        let mut set = ConnectionSet::new();
        set.create("a", "b", ConnectionType::Reference).unwrap();
        set.create("b", "a", ConnectionType::Reference).unwrap();
        set.create("a", "b", ConnectionType::Dependency).unwrap();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_remove_reopens_reverse_edge() {
        let mut set = ConnectionSet::new();
        let id = set.create("a", "b", ConnectionType::Dependency).unwrap().id;
        assert!(set.create("b", "a", ConnectionType::Dependency).is_err());

        assert!(set.remove(&id).is_some());
        assert!(set.remove(&id).is_none());
        assert!(set.create("b", "a", ConnectionType::Dependency).is_ok());
    }

    #[test]
    fn test_symmetric_lookup() {
        let mut set = ConnectionSet::new();
        set.create("a", "b", ConnectionType::Dependency).unwrap();
        set.create("c", "a", ConnectionType::Sequential).unwrap();
        assert_eq!(set.for_task("a").len(), 2);
        assert_eq!(set.for_task("b").len(), 1);
        assert!(set.for_task("z").is_empty());
    }

    #[test]
    fn test_retain_endpoints() {
        let mut set = ConnectionSet::new();
        set.create("a", "b", ConnectionType::Dependency).unwrap();
        set.create("b", "c", ConnectionType::Dependency).unwrap();
        let live: HashSet<TaskId> = ["a", "b"].iter().map(|s| s.to_string()).collect();

        let removed = set.retain_endpoints(&live);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].to_task_id, "c");
        assert!(set.for_task("c").is_empty());
        assert_eq!(set.dependency_graph().edge_count(), 1);
    }

    #[test]
    fn test_restore_rejects_reused_id_without_touching_graph() {
        let mut set = ConnectionSet::new();
        let first = TaskConnection::new("a", "b", ConnectionType::Dependency);
        let mut reused = TaskConnection::new("b", "c", ConnectionType::Dependency);
        reused.id = first.id;

        set.restore(first.clone()).unwrap();
        assert_eq!(
            set.restore(reused).unwrap_err(),
            ConnectionError::DuplicateId { id: first.id }
        );
        assert_eq!(set.dependency_graph().edge_count(), 1);
        assert!(set.for_task("c").is_empty());
        assert!(set.create("c", "a", ConnectionType::Dependency).is_ok());
    }
}
