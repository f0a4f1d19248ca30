//! Layers for the map view that can handle input, and draw on top of the map tiles.

use egui::{Painter, Pos2, Rect, Response, Vec2};
use std::any::Any;

use crate::projection::MapProjection;

/// Building markers.
pub mod marker;

/// The user's own position and its accuracy.
pub mod position;

/// A trait for map layers.
pub trait Layer: Any {
    /// Handles user input for the layer. Returns `true` if the input was handled and should not be
    /// processed further by the map.
    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool;

    /// Draws the layer.
    fn draw(&self, painter: &Painter, projection: &MapProjection);

    /// Gets the layer as a `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Gets the layer as a mutable `dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The screen rectangle of a pin icon of `size` whose tip sits on `anchor`.
///
/// Icons are anchored at their bottom center so the tip points at the location.
pub(crate) fn pin_rect(anchor: Pos2, size: f32) -> Rect {
    Rect::from_min_size(anchor - Vec2::new(size / 2.0, size), Vec2::splat(size))
}
