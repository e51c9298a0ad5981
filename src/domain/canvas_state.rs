use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::connection::{ConnectionSet, TaskConnection};
use super::geometry::Position;
use super::section::{CanvasSection, SectionId};
use super::selection::SelectionState;
use super::task::TaskId;
use super::viewport::Viewport;

pub const DOCUMENT_VERSION: &str = "1.0";

/// Smallest accepted grid spacing, in world units.
pub const MIN_GRID_SIZE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSettings {
    pub show_grid: bool,
    pub snap_to_grid: bool,
    pub grid_size: f64,
    pub auto_layout: bool,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            show_grid: true,
            snap_to_grid: false,
            grid_size: 20.0,
            auto_layout: false,
        }
    }
}

impl CanvasSettings {
    pub fn has_valid_grid(&self) -> bool {
        self.grid_size.is_finite() && self.grid_size >= MIN_GRID_SIZE
    }
}

/// Live state of one canvas session. Only `CanvasEngine` mutates it.
#[derive(Debug, Clone, Default)]
pub struct CanvasState {
    pub viewport: Viewport,
    pub sections: Vec<CanvasSection>,
    pub task_positions: BTreeMap<TaskId, Position>,
    pub connections: ConnectionSet,
    pub section_assignments: BTreeMap<TaskId, SectionId>,
    pub selection: SelectionState,
    pub settings: CanvasSettings,
}

/// Persisted snapshot of a canvas. Selection is deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanvasStateDocument {
    pub viewport: Viewport,
    pub task_positions: BTreeMap<TaskId, Position>,
    pub sections: Vec<CanvasSection>,
    pub connections: Vec<TaskConnection>,
    #[serde(default)]
    pub section_assignments: BTreeMap<TaskId, SectionId>,
    pub settings: CanvasSettings,
    pub last_modified: DateTime<Utc>,
    pub version: String,
}

impl CanvasState {
    pub fn section(&self, id: &SectionId) -> Option<&CanvasSection> {
        self.sections.iter().find(|s| s.id == *id)
    }

    pub fn section_index(&self, id: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| s.id == *id)
    }

    pub fn to_document(&self, last_modified: DateTime<Utc>) -> CanvasStateDocument {
        CanvasStateDocument {
            viewport: self.viewport,
            task_positions: self.task_positions.clone(),
            sections: self.sections.clone(),
            connections: self.connections.iter().cloned().collect(),
            section_assignments: self.section_assignments.clone(),
            settings: self.settings,
            last_modified,
            version: DOCUMENT_VERSION.to_string(),
        }
    }
}

impl CanvasStateDocument {
    /// Major component of `version`, e.g. `1` for `"1.0"`.
    pub fn major_version(&self) -> Option<u32> {
        self.version.split('.').next()?.trim().parse().ok()
    }

    pub fn is_compatible(&self) -> bool {
        let current = DOCUMENT_VERSION
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok());
        self.major_version().is_some() && self.major_version() == current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ConnectionType;

    #[test]
    fn test_document_uses_camel_case_schema() {
        let mut state = CanvasState::default();
        state
            .task_positions
            .insert("a".to_string(), Position::new(1.0, 2.0));
        state
            .connections
            .create("a", "b", ConnectionType::Dependency)
            .unwrap();

        let doc = state.to_document(Utc::now());
        let json = serde_json::to_value(&doc).unwrap();
        for key in [
            "viewport",
            "taskPositions",
            "sections",
            "connections",
            "settings",
            "lastModified",
            "version",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["settings"]["snapToGrid"], false);
        assert_eq!(json["connections"][0]["fromTaskId"], "a");
        assert_eq!(json["connections"][0]["type"], "dependency");
        assert_eq!(json["version"], DOCUMENT_VERSION);
    }

    #[test]
    fn test_assignments_optional_on_read() {
        let json = serde_json::json!({
            "viewport": {"x": 0.0, "y": 0.0, "zoom": 1.0},
            "taskPositions": {"a": {"x": 5.0, "y": 6.0}},
            "sections": [],
            "connections": [],
            "settings": {"showGrid": true, "snapToGrid": false, "gridSize": 20.0, "autoLayout": false},
            "lastModified": "2024-05-01T10:00:00Z",
            "version": "1.0"
        });
        let doc: CanvasStateDocument = serde_json::from_value(json).unwrap();
        assert!(doc.section_assignments.is_empty());
        assert_eq!(doc.task_positions["a"], Position::new(5.0, 6.0));
        assert!(doc.is_compatible());
    }

    #[test]
    fn test_version_compatibility() {
        let mut doc = CanvasState::default().to_document(Utc::now());
        doc.version = "1.7".to_string();
        assert!(doc.is_compatible());
        doc.version = "2.0".to_string();
        assert!(!doc.is_compatible());
        doc.version = "garbage".to_string();
        assert!(!doc.is_compatible());
    }
}
