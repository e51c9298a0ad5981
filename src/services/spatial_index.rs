use ordered_float::OrderedFloat;
use rstar::{Envelope, PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashMap;

use crate::domain::geometry::{point_in_polygon, Point, Position, Rect, Size};
use crate::domain::task::TaskId;

#[derive(Debug, Clone, PartialEq)]
struct NodeEntry {
    task_id: TaskId,
    min: [f64; 2],
    max: [f64; 2],
}

impl NodeEntry {
    fn new(task_id: TaskId, position: Position, size: Size) -> Self {
        Self {
            task_id,
            min: [position.x, position.y],
            max: [position.x + size.width, position.y + size.height],
        }
    }

    fn center(&self) -> Point {
        Point::new(
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
        )
    }
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

impl PointDistance for NodeEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope().distance_2(point)
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.envelope().contains_point(point)
    }
}

fn envelope_of(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

/// R-tree over node bounding boxes, kept in step with the task position map.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<NodeEntry>,
    entries: HashMap<TaskId, NodeEntry>,
    node_size: Size,
}

impl SpatialIndex {
    pub fn new(node_size: Size) -> Self {
        Self {
            tree: RTree::new(),
            entries: HashMap::new(),
            node_size,
        }
    }

    /// Rebuild from scratch; used after hydration and bulk pruning.
    pub fn rebuild<'a>(&mut self, positions: impl IntoIterator<Item = (&'a TaskId, &'a Position)>) {
        let entries: Vec<NodeEntry> = positions
            .into_iter()
            .map(|(id, pos)| NodeEntry::new(id.clone(), *pos, self.node_size))
            .collect();
        self.entries = entries
            .iter()
            .map(|e| (e.task_id.clone(), e.clone()))
            .collect();
        self.tree = RTree::bulk_load(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upsert(&mut self, task_id: &str, position: Position) {
        if let Some(old) = self.entries.remove(task_id) {
            self.tree.remove(&old);
        }
        let entry = NodeEntry::new(task_id.to_string(), position, self.node_size);
        self.tree.insert(entry.clone());
        self.entries.insert(task_id.to_string(), entry);
    }

    pub fn remove(&mut self, task_id: &str) -> bool {
        match self.entries.remove(task_id) {
            Some(old) => {
                self.tree.remove(&old);
                true
            }
            None => false,
        }
    }

    /// Nodes whose bounding box overlaps `rect` (edges inclusive).
    pub fn intersecting(&self, rect: &Rect) -> Vec<TaskId> {
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(rect))
            .map(|e| e.task_id.clone())
            .collect()
    }

    /// Nodes whose center lies inside `polygon` by the even-odd rule.
    pub fn centers_in_polygon(&self, polygon: &[Point]) -> Vec<TaskId> {
        let Some(bounds) = Rect::bounding(polygon) else {
            return Vec::new();
        };
        if polygon.len() < 3 {
            return Vec::new();
        }
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(&bounds))
            .filter(|e| {
                let center = e.center();
                bounds.contains(center) && point_in_polygon(center, polygon)
            })
            .map(|e| e.task_id.clone())
            .collect()
    }

    /// The node under `point`; when boxes overlap, the one whose center is nearest wins.
    pub fn at_point(&self, point: Point) -> Option<TaskId> {
        self.tree
            .locate_all_at_point(&[point.x, point.y])
            .min_by_key(|e| {
                let c = e.center();
                OrderedFloat((c.x - point.x).powi(2) + (c.y - point.y).powi(2))
            })
            .map(|e| e.task_id.clone())
    }
}
