use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::connection::ConnectionId;
use super::task::TaskId;

/// Directed graph of `dependency` edges, kept acyclic by its only writer,
/// [`ConnectionSet`](super::connection::ConnectionSet).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ConnectionId>,
    node_map: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, task_id: &str) -> NodeIndex {
        if let Some(&node) = self.node_map.get(task_id) {
            return node;
        }
        let node = self.graph.add_node(task_id.to_string());
        self.node_map.insert(task_id.to_string(), node);
        node
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether `to` already reaches `from`, i.e. whether `from -> to` would close a cycle.
    ///
    /// Depth-first from `to`; the DFS keeps its own visited set so each node is
    /// expanded at most once, even if the graph were somehow malformed.
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let (Some(&from_node), Some(&to_node)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return false;
        };

        let mut dfs = Dfs::new(&self.graph, to_node);
        let mut steps = 0usize;
        let limit = self.graph.node_count();
        while let Some(node) = dfs.next(&self.graph) {
            if node == from_node {
                return true;
            }
            steps += 1;
            if steps > limit {
                break;
            }
        }
        false
    }

    /// Adds an edge without checking. Callers check `would_create_cycle` first.
    pub(crate) fn insert_edge(&mut self, from: &str, to: &str, id: ConnectionId) {
        let from_node = self.node(from);
        let to_node = self.node(to);
        self.graph.add_edge(from_node, to_node, id);
    }

    pub(crate) fn remove_edge(&mut self, from: &str, to: &str, id: ConnectionId) -> bool {
        let (Some(&from_node), Some(&to_node)) = (self.node_map.get(from), self.node_map.get(to))
        else {
            return false;
        };
        let edge = self
            .graph
            .edges_connecting(from_node, to_node)
            .find(|e| *e.weight() == id)
            .map(|e| e.id());
        match edge {
            Some(edge) => {
                self.graph.remove_edge(edge);
                self.prune_if_isolated(from);
                self.prune_if_isolated(to);
                true
            }
            None => false,
        }
    }

    /// Drop a node with no edges left. `remove_node` moves the last node into
    /// the freed index, so that node's map entry is repointed.
    fn prune_if_isolated(&mut self, task_id: &str) {
        let Some(&node) = self.node_map.get(task_id) else {
            return;
        };
        if self.graph.neighbors_undirected(node).next().is_some() {
            return;
        }
        let last = NodeIndex::new(self.graph.node_count() - 1);
        if let Some(removed) = self.graph.remove_node(node) {
            self.node_map.remove(&removed);
        }
        if node != last {
            let moved = self.graph[node].clone();
            self.node_map.insert(moved, node);
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn has_cycle(&self) -> bool {
        toposort(&self.graph, None).is_err()
    }

    /// Tasks ordered so every dependency comes before its dependents.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>, String> {
        match toposort(&self.graph, None) {
            Ok(sorted_nodes) => Ok(sorted_nodes
                .into_iter()
                .map(|node| self.graph[node].clone())
                .collect()),
            Err(_) => Err("Graph contains a cycle".to_string()),
        }
    }

    /// Tasks that `task_id` points at.
    pub fn successors(&self, task_id: &str) -> Vec<TaskId> {
        self.neighbors(task_id, Direction::Outgoing)
    }

    /// Tasks pointing at `task_id`.
    pub fn predecessors(&self, task_id: &str) -> Vec<TaskId> {
        self.neighbors(task_id, Direction::Incoming)
    }

    fn neighbors(&self, task_id: &str, direction: Direction) -> Vec<TaskId> {
        let Some(&node) = self.node_map.get(task_id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.graph[other].clone()
            })
            .collect()
    }

    /// A task can start once every task it depends on is complete.
    pub fn can_start_task(&self, task_id: &str, completed_tasks: &HashSet<TaskId>) -> bool {
        self.predecessors(task_id)
            .iter()
            .all(|dep| completed_tasks.contains(dep))
    }
}
