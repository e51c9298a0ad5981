use serde::{Deserialize, Serialize};

use super::geometry::Point;

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 5.0;

/// Pan/zoom transform: `screen = (world + (x, y)) * zoom`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// Partial viewport update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewportPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub zoom: Option<f64>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn apply(&self, patch: &ViewportPatch) -> Viewport {
        Viewport {
            x: patch.x.unwrap_or(self.x),
            y: patch.y.unwrap_or(self.y),
            zoom: patch.zoom.unwrap_or(self.zoom),
        }
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(screen.x / self.zoom - self.x, screen.y / self.zoom - self.y)
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new((world.x + self.x) * self.zoom, (world.y + self.y) * self.zoom)
    }

    /// Zoom by `factor` keeping the world point under `anchor` (screen space) fixed.
    pub fn zoomed_at(&self, factor: f64, anchor: Point, min_zoom: f64, max_zoom: f64) -> Viewport {
        let world = self.screen_to_world(anchor);
        let zoom = (self.zoom * factor).clamp(min_zoom, max_zoom);
        Viewport {
            x: anchor.x / zoom - world.x,
            y: anchor.y / zoom - world.y,
            zoom,
        }
    }
}

impl ViewportPatch {
    pub fn zoom(zoom: f64) -> Self {
        Self {
            zoom: Some(zoom),
            ..Default::default()
        }
    }

    pub fn pan(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            zoom: None,
        }
    }
}
