use egui::{Align2, Color32, FontId, Painter, Response, Stroke, vec2};
use std::any::Any;

use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection};

/// A located position and its accuracy radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatedPosition {
    /// The position.
    pub pos: GeoPos,
    /// Accuracy radius in meters.
    pub accuracy: f64,
}

/// Shows where the user is, with a circle for the accuracy of the fix.
#[derive(Clone, Debug)]
pub struct PositionLayer {
    located: Option<LocatedPosition>,

    /// Stroke of the accuracy circle.
    pub stroke: Stroke,
    /// Fill of the accuracy circle.
    pub fill: Color32,
}

impl Default for PositionLayer {
    fn default() -> Self {
        Self {
            located: None,
            stroke: Stroke::new(2.0, Color32::from_rgb(51, 136, 255)),
            fill: Color32::from_rgba_unmultiplied(51, 136, 255, 50),
        }
    }
}

impl PositionLayer {
    /// Shows `located`, replacing the previous position.
    pub fn set(&mut self, located: LocatedPosition) {
        self.located = Some(located);
    }

    /// Hides the position.
    pub fn clear(&mut self) {
        self.located = None;
    }

    /// The position currently shown.
    pub fn located(&self) -> Option<LocatedPosition> {
        self.located
    }
}

impl Layer for PositionLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, _response: &Response, _projection: &MapProjection) -> bool {
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        let Some(located) = self.located else {
            return;
        };

        let center = projection.project(located.pos);
        let radius = projection.meters_to_points(located.accuracy, located.pos.lat);
        painter.circle(center, radius, self.fill, self.stroke);
        painter.circle(center, 6.0, self.stroke.color, Stroke::new(2.0, Color32::WHITE));

        let galley = painter.layout_no_wrap(
            "You are here".to_string(),
            FontId::proportional(13.0),
            Color32::BLACK,
        );
        let label_rect = Align2::CENTER_BOTTOM
            .anchor_size(center - vec2(0.0, 12.0), galley.size())
            .expand(4.0);
        painter.rect_filled(label_rect, 3.0, Color32::from_white_alpha(230));
        painter.galley(label_rect.min + vec2(4.0, 4.0), galley, Color32::BLACK);
    }
}
