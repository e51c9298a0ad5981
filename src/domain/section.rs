use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{Point, Position, Rect, Size};
use super::task::{Priority, Task, TaskStatus};

pub type SectionId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Priority,
    Status,
    Project,
    Custom,
}

/// A canvas region grouping tasks, optionally auto-collecting them by filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSection {
    pub id: SectionId,
    pub name: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub position: Position,
    pub size: Size,
    pub color: String,
    /// Filter value; `None` only for custom sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_value: Option<String>,
    pub is_visible: bool,
    pub is_collapsed: bool,
    /// Height before collapsing; only present while collapsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed_height: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Compiled filter predicate of a section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionFilter {
    Priority(Priority),
    Status(TaskStatus),
    Project(String),
}

/// Origin plus size, as supplied by the section creation form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SectionRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSection {
    pub name: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub position: SectionRect,
    pub color: String,
    #[serde(default)]
    pub property_value: Option<String>,
}

/// Partial section update; only supplied fields are validated and applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionPatch {
    pub name: Option<String>,
    pub section_type: Option<SectionType>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub color: Option<String>,
    pub property_value: Option<String>,
    pub is_visible: Option<bool>,
}

impl SectionFilter {
    /// Build the filter for a section type and value. Custom sections have none.
    pub fn parse(section_type: SectionType, value: Option<&str>) -> Result<Option<Self>, String> {
        let required = || {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| "Property value is required for non-custom sections".to_string())
        };

        let filter = match section_type {
            SectionType::Custom => return Ok(None),
            SectionType::Priority => SectionFilter::Priority(required()?.parse()?),
            SectionType::Status => SectionFilter::Status(required()?.parse()?),
            SectionType::Project => SectionFilter::Project(required()?.to_string()),
        };
        Ok(Some(filter))
    }

    pub fn matches(&self, task: &Task) -> bool {
        match self {
            SectionFilter::Priority(p) => task.priority == *p,
            SectionFilter::Status(s) => task.status == *s,
            SectionFilter::Project(project) => task.project_id.as_deref() == Some(project.as_str()),
        }
    }
}

impl CanvasSection {
    pub fn new(data: NewSection) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name.trim().to_string(),
            section_type: data.section_type,
            position: Position::new(data.position.x, data.position.y),
            size: Size::new(data.position.width, data.position.height),
            color: data.color,
            property_value: data
                .property_value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            is_visible: true,
            is_collapsed: false,
            collapsed_height: None,
            created_at: Utc::now(),
        }
    }

    /// The section's filter, or `None` for custom sections and unparsable values.
    pub fn filter(&self) -> Option<SectionFilter> {
        SectionFilter::parse(self.section_type, self.property_value.as_deref())
            .ok()
            .flatten()
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.filter().is_some_and(|f| f.matches(task))
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub fn contains(&self, point: Point) -> bool {
        self.bounds().contains(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_section(section_type: SectionType, value: Option<&str>) -> NewSection {
        NewSection {
            name: "  Focus  ".to_string(),
            section_type,
            position: SectionRect { x: 10.0, y: 20.0, width: 300.0, height: 400.0 },
            color: "#ff0000".to_string(),
            property_value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_new_section_defaults() {
        let section = CanvasSection::new(new_section(SectionType::Priority, Some("high")));
        assert_eq!(section.name, "Focus");
        assert!(section.is_visible);
        assert!(!section.is_collapsed);
        assert!(section.collapsed_height.is_none());
        assert_eq!(section.size, Size::new(300.0, 400.0));
        assert_eq!(section.filter(), Some(SectionFilter::Priority(Priority::High)));
    }

    #[test]
    fn test_filter_matching() {
        let task = Task::new("t", "Task")
            .with_priority(Priority::High)
            .with_status(TaskStatus::Blocked)
            .with_project("alpha");

        assert!(SectionFilter::Priority(Priority::High).matches(&task));
        assert!(!SectionFilter::Priority(Priority::Low).matches(&task));
        assert!(SectionFilter::Status(TaskStatus::Blocked).matches(&task));
        assert!(SectionFilter::Project("alpha".into()).matches(&task));
        assert!(!SectionFilter::Project("beta".into()).matches(&Task::new("u", "No project")));
    }

    #[test]
    fn test_filter_parse_errors() {
        assert!(SectionFilter::parse(SectionType::Priority, None).is_err());
        assert!(SectionFilter::parse(SectionType::Status, Some("   ")).is_err());
        assert!(SectionFilter::parse(SectionType::Status, Some("sleeping")).is_err());
        assert_eq!(SectionFilter::parse(SectionType::Custom, None), Ok(None));
    }

    #[test]
    fn test_custom_section_never_matches() {
        let section = CanvasSection::new(new_section(SectionType::Custom, None));
        assert!(!section.matches(&Task::new("t", "Anything")));
    }

    #[test]
    fn test_serialized_field_names() {
        let section = CanvasSection::new(new_section(SectionType::Status, Some("done")));
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["isVisible"], true);
        assert_eq!(json["propertyValue"], "done");
        assert!(json.get("collapsedHeight").is_none());
    }
}
