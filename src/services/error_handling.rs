use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::connection::ConnectionError;
use crate::domain::validation::ValidationReport;

/// Recoverable rejections of canvas mutations. None of these leave state modified.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanvasError {
    #[error("Zoom {zoom} is outside the allowed range [{min}, {max}]")]
    ZoomOutOfRange { zoom: f64, min: f64, max: f64 },

    #[error("Viewport values must be finite numbers")]
    NonFiniteViewport,

    #[error("Invalid position for {task_id}: x={x}, y={y} (must be finite and within ±{limit})")]
    InvalidPosition {
        task_id: String,
        x: f64,
        y: f64,
        limit: f64,
    },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Section not found: {id}")]
    SectionNotFound { id: Uuid },

    #[error("Cannot delete section containing tasks")]
    SectionNotEmpty { id: Uuid, task_count: usize },

    #[error("Section validation failed: {0}")]
    Validation(ValidationReport),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Grid size must be a finite number of at least 1, got {grid_size}")]
    InvalidGridSize { grid_size: f64 },
}

/// Failures loading or interpreting a persisted snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Unsupported canvas document version {found} (expected {expected})")]
    IncompatibleVersion { found: String, expected: String },

    #[error("Canvas store '{store}' failed: {source}")]
    Store {
        store: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<ValidationReport> for CanvasError {
    fn from(report: ValidationReport) -> Self {
        CanvasError::Validation(report)
    }
}

/// Structured logging for rejected input
pub fn log_rejection(operation: &str, error: &CanvasError) {
    warn!(
        operation = %operation,
        error = %error,
        "Canvas mutation rejected"
    );
}

/// User-friendly error messages
pub struct UserErrorFormatter;

impl UserErrorFormatter {
    pub fn format_canvas_error(error: &CanvasError) -> String {
        match error {
            CanvasError::ZoomOutOfRange { min, max, .. } => {
                format!("Zoom must stay between {:.0}% and {:.0}%.", min * 100.0, max * 100.0)
            }
            CanvasError::NonFiniteViewport => "The view could not be moved there.".to_string(),
            CanvasError::InvalidPosition { .. } => {
                "A task can't be placed that far from the center of the canvas.".to_string()
            }
            CanvasError::TaskNotFound { .. } => "The requested task could not be found.".to_string(),
            CanvasError::SectionNotFound { .. } => "That section no longer exists.".to_string(),
            CanvasError::SectionNotEmpty { task_count, .. } => format!(
                "Move the {} task{} out of this section before deleting it.",
                task_count,
                if *task_count == 1 { "" } else { "s" }
            ),
            CanvasError::Validation(report) => format!("Please fix: {}", report.errors.join(", ")),
            CanvasError::Connection(ConnectionError::Cycle { .. }) => {
                "Cannot create this dependency as it would create a circular reference.".to_string()
            }
            CanvasError::Connection(ConnectionError::Duplicate { .. }) => {
                "These tasks are already connected.".to_string()
            }
            CanvasError::Connection(ConnectionError::SelfLoop { .. }) => {
                "A task cannot depend on itself.".to_string()
            }
            CanvasError::Connection(ConnectionError::DuplicateId { .. }) => {
                "This connection has already been added.".to_string()
            }
            CanvasError::InvalidGridSize { .. } => "Grid size must be at least 1.".to_string(),
        }
    }

    pub fn format_save_error(error: &str) -> String {
        if error.contains("Permission denied") || error.contains("permission") {
            return "Your canvas could not be saved: permission denied. Changes are kept in memory.".to_string();
        }
        if error.contains("database") || error.contains("sqlite") {
            return "A database error occurred while saving. Your next change will retry.".to_string();
        }
        "Your canvas could not be saved. Your next change will retry.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_not_empty_message_matches_contract() {
        let err = CanvasError::SectionNotEmpty {
            id: Uuid::new_v4(),
            task_count: 2,
        };
        assert_eq!(err.to_string(), "Cannot delete section containing tasks");
        assert_eq!(
            UserErrorFormatter::format_canvas_error(&err),
            "Move the 2 tasks out of this section before deleting it."
        );
    }

    #[test]
    fn test_connection_errors_convert() {
        let err: CanvasError = ConnectionError::Cycle {
            from: "b".into(),
            to: "a".into(),
        }
        .into();
        assert!(err.to_string().contains("Circular dependency"));
        assert!(UserErrorFormatter::format_canvas_error(&err).contains("circular"));
    }

    #[test]
    fn test_save_error_formatting() {
        assert!(UserErrorFormatter::format_save_error("sqlite: disk I/O error").contains("database"));
        assert!(UserErrorFormatter::format_save_error("boom").contains("retry"));
    }
}
