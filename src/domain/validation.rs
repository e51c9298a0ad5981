use serde::{Deserialize, Serialize};
use std::fmt;

use super::geometry::{Position, Size};
use super::section::{CanvasSection, NewSection, SectionFilter, SectionPatch, SectionType};

pub const MAX_SECTION_NAME_LEN: usize = 100;

/// Structured outcome of a section validation: `{isValid, errors}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
        }
    }

    fn push(&mut self, error: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(error.into());
    }

    pub fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_valid { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(f, "valid")
        } else {
            write!(f, "{}", self.errors.join("; "))
        }
    }
}

impl std::error::Error for ValidationReport {}

pub struct SectionValidator {
    coordinate_limit: f64,
}

impl SectionValidator {
    pub fn new(coordinate_limit: f64) -> Self {
        Self { coordinate_limit }
    }

    /// Validate a section before creation; collects every failure, not just the first.
    pub fn validate_new(&self, data: &NewSection) -> ValidationReport {
        let mut report = ValidationReport::valid();
        self.check_name(&data.name, &mut report);
        self.check_position(
            Position::new(data.position.x, data.position.y),
            &mut report,
        );
        Self::check_size(
            Size::new(data.position.width, data.position.height),
            &mut report,
        );
        Self::check_color(&data.color, &mut report);
        Self::check_filter(data.section_type, data.property_value.as_deref(), &mut report);
        report
    }

    /// Validate only the fields present in `patch`, against the section it would modify.
    pub fn validate_patch(&self, current: &CanvasSection, patch: &SectionPatch) -> ValidationReport {
        let mut report = ValidationReport::valid();
        if let Some(name) = &patch.name {
            self.check_name(name, &mut report);
        }
        if let Some(position) = patch.position {
            self.check_position(position, &mut report);
        }
        if let Some(size) = patch.size {
            Self::check_size(size, &mut report);
        }
        if let Some(color) = &patch.color {
            Self::check_color(color, &mut report);
        }
        if patch.section_type.is_some() || patch.property_value.is_some() {
            let section_type = patch.section_type.unwrap_or(current.section_type);
            let value = patch
                .property_value
                .as_deref()
                .or(current.property_value.as_deref());
            Self::check_filter(section_type, value, &mut report);
        }
        report
    }

    /// Validation applied to sections coming from a persisted document.
    pub fn validate_existing(&self, section: &CanvasSection) -> ValidationReport {
        let mut report = ValidationReport::valid();
        self.check_name(&section.name, &mut report);
        self.check_position(section.position, &mut report);
        Self::check_size(section.size, &mut report);
        Self::check_color(&section.color, &mut report);
        Self::check_filter(
            section.section_type,
            section.property_value.as_deref(),
            &mut report,
        );
        Self::check_collapse(section.is_collapsed, section.collapsed_height, &mut report);
        report
    }

    fn check_name(&self, name: &str, report: &mut ValidationReport) {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            report.push("Section name is required");
        } else if trimmed.chars().count() > MAX_SECTION_NAME_LEN {
            report.push(format!(
                "Section name must be {MAX_SECTION_NAME_LEN} characters or less"
            ));
        }
    }

    fn check_position(&self, position: Position, report: &mut ValidationReport) {
        if !position.is_finite() {
            report.push("Section position must be finite");
        } else if !position.is_within(self.coordinate_limit) {
            report.push(format!(
                "Section position must be within ±{}",
                self.coordinate_limit
            ));
        }
    }

    fn check_size(size: Size, report: &mut ValidationReport) {
        if !size.width.is_finite() || size.width <= 0.0 {
            report.push("Section width must be greater than 0");
        }
        if !size.height.is_finite() || size.height <= 0.0 {
            report.push("Section height must be greater than 0");
        }
    }

    /// A collapsed section remembers a usable expanded height; an expanded one remembers nothing.
    fn check_collapse(is_collapsed: bool, collapsed_height: Option<f64>, report: &mut ValidationReport) {
        match (is_collapsed, collapsed_height) {
            (true, Some(h)) if h.is_finite() && h > 0.0 => {}
            (true, _) => report.push("Collapsed section must store a height greater than 0"),
            (false, Some(_)) => report.push("Expanded section must not store a collapsed height"),
            (false, None) => {}
        }
    }

    fn check_color(color: &str, report: &mut ValidationReport) {
        if color.trim().is_empty() {
            report.push("Section color is required");
        }
    }

    fn check_filter(section_type: SectionType, value: Option<&str>, report: &mut ValidationReport) {
        if let Err(reason) = SectionFilter::parse(section_type, value) {
            report.push(reason);
        }
    }
}
