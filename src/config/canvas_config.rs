use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::domain::geometry::Size;
use crate::domain::viewport::{MAX_ZOOM, MIN_ZOOM};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    /// Quiet period after the last mutation before a snapshot is written (ms)
    pub debounce_ms: u64,

    /// Minimum spacing between committed drag updates (ms)
    pub drag_throttle_ms: u64,

    pub min_zoom: f64,
    pub max_zoom: f64,

    /// Node and section coordinates must stay within ±this value
    pub coordinate_limit: f64,

    /// Default node box used for hit-testing and section layout
    pub node_width: f64,
    pub node_height: f64,

    /// Height a section shrinks to when collapsed
    pub collapsed_section_height: f64,

    /// Gap between nodes laid out inside a section
    pub section_padding: f64,

    /// Local JSON snapshot file
    pub snapshot_path: Option<PathBuf>,

    /// SQLite database holding the previous/remote snapshot
    pub database_path: Option<PathBuf>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            drag_throttle_ms: 16, // ~60fps
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            coordinate_limit: 50_000.0,
            node_width: 200.0,
            node_height: 80.0,
            collapsed_section_height: 40.0,
            section_padding: 20.0,
            snapshot_path: None,
            database_path: None,
        }
    }
}

impl CanvasConfig {
    /// Load configuration from the user config directory, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            default_config.save_to(path)?;
            Ok(default_config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Canvas configuration saved");
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("plon").join("canvas.toml"))
    }

    /// Snapshot file, defaulting to the platform data directory
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.snapshot_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("plon").join("canvas-state.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_zoom > 0.0 && self.min_zoom < self.max_zoom) {
            bail!(
                "Invalid zoom bounds: min_zoom={} max_zoom={}",
                self.min_zoom,
                self.max_zoom
            );
        }
        if !(self.coordinate_limit.is_finite() && self.coordinate_limit > 0.0) {
            bail!("coordinate_limit must be a positive finite number");
        }
        if !self.node_size().is_valid() {
            bail!("node_width and node_height must be greater than 0");
        }
        if !(self.collapsed_section_height > 0.0) || self.section_padding < 0.0 {
            bail!("Section layout values must be non-negative");
        }
        Ok(())
    }

    pub fn node_size(&self) -> Size {
        Size::new(self.node_width, self.node_height)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn drag_throttle(&self) -> Duration {
        Duration::from_millis(self.drag_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = CanvasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce(), Duration::from_millis(2000));
        assert_eq!(config.drag_throttle(), Duration::from_millis(16));
    }

    #[test]
    fn test_rejects_inverted_zoom_bounds() {
        let config = CanvasConfig {
            min_zoom: 3.0,
            max_zoom: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_writes_defaults_then_reads_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plon").join("canvas.toml");

        let first = CanvasConfig::load_from(&path).unwrap();
        assert_eq!(first, CanvasConfig::default());
        assert!(path.exists());

        std::fs::write(&path, "debounce_ms = 500\nnode_width = 120.0\n").unwrap();
        let second = CanvasConfig::load_from(&path).unwrap();
        assert_eq!(second.debounce_ms, 500);
        assert_eq!(second.node_width, 120.0);
        assert_eq!(second.drag_throttle_ms, 16);
    }
}
