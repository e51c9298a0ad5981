use tracing::debug;

use super::CanvasEngine;
use crate::domain::geometry::Point;
use crate::domain::viewport::{Viewport, ViewportPatch};
use crate::services::error_handling::{log_rejection, CanvasError};

impl CanvasEngine {
    /// Replace the viewport with `patch` applied, or reject and keep the old one.
    pub fn update_viewport(&mut self, patch: ViewportPatch) -> Result<Viewport, CanvasError> {
        let next = self.state.viewport.apply(&patch);
        if let Err(e) = self.check_viewport(&next) {
            log_rejection("update_viewport", &e);
            return Err(e);
        }
        self.state.viewport = next;
        debug!(x = next.x, y = next.y, zoom = next.zoom, "Viewport updated");
        self.mark_changed();
        Ok(next)
    }

    fn check_viewport(&self, viewport: &Viewport) -> Result<(), CanvasError> {
        if !(viewport.x.is_finite() && viewport.y.is_finite() && viewport.zoom.is_finite()) {
            return Err(CanvasError::NonFiniteViewport);
        }
        let (min, max) = (self.config.min_zoom, self.config.max_zoom);
        if viewport.zoom < min || viewport.zoom > max {
            return Err(CanvasError::ZoomOutOfRange {
                zoom: viewport.zoom,
                min,
                max,
            });
        }
        Ok(())
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) -> Result<Viewport, CanvasError> {
        let current = self.state.viewport;
        self.update_viewport(ViewportPatch::pan(current.x + dx, current.y + dy))
    }

    /// Zoom around a screen-space anchor, clamping to the configured bounds.
    pub fn zoom_at(&mut self, factor: f64, anchor: Point) -> Result<Viewport, CanvasError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(CanvasError::NonFiniteViewport);
        }
        let next = self.state.viewport.zoomed_at(
            factor,
            anchor,
            self.config.min_zoom,
            self.config.max_zoom,
        );
        self.update_viewport(ViewportPatch {
            x: Some(next.x),
            y: Some(next.y),
            zoom: Some(next.zoom),
        })
    }

    pub fn reset_viewport(&mut self) {
        self.state.viewport = Viewport::default();
        self.mark_changed();
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.state.viewport.screen_to_world(screen)
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.state.viewport.world_to_screen(world)
    }
}
