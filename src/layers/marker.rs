use egui::{Align2, Color32, FontId, Painter, Pos2, Response, Shape, Stroke, pos2, vec2};
use std::any::Any;

use crate::catalog::{Catalog, LocationId};
use crate::layers::{Layer, pin_rect};
use crate::projection::{GeoPos, MapProjection};

/// A building on the map.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    /// The catalog id the marker leads to.
    pub id: LocationId,
    /// Where the building is.
    pub pos: GeoPos,
    /// Shown when hovering the marker.
    pub label: String,
}

/// A layer with one clickable building marker per catalog entry.
///
/// Clicking a marker records its id, which the owner picks up with
/// [`MarkerLayer::take_activated`].
#[derive(Clone, Debug)]
pub struct MarkerLayer {
    markers: Vec<Marker>,
    activated: Option<LocationId>,
    hovered: Option<usize>,

    /// Edge length of the marker icon.
    pub size: f32,
    /// Fill color of the marker icon.
    pub fill: Color32,
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            activated: None,
            hovered: None,
            size: 48.0,
            fill: Color32::from_rgb(0, 94, 184),
        }
    }
}

impl MarkerLayer {
    /// Creates a layer with a marker for every record in `catalog`.
    pub fn from_catalog(catalog: &Catalog, size: f32) -> Self {
        let markers = catalog
            .iter()
            .map(|record| Marker {
                id: record.id.clone(),
                pos: record.geo_pos(),
                label: record.display_name(),
            })
            .collect();
        Self {
            markers,
            size,
            ..Default::default()
        }
    }

    /// The markers of this layer.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Returns the id of the marker clicked since the last call, if any.
    pub fn take_activated(&mut self) -> Option<LocationId> {
        self.activated.take()
    }

    /// The topmost marker whose icon covers `screen_pos`.
    fn marker_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<usize> {
        // Later markers are drawn on top, so search from the back.
        self.markers
            .iter()
            .enumerate()
            .rev()
            .find(|(_, marker)| pin_rect(projection.project(marker.pos), self.size).contains(screen_pos))
            .map(|(i, _)| i)
    }
}

impl Layer for MarkerLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        self.hovered = response
            .hover_pos()
            .and_then(|pos| self.marker_at(pos, projection));

        if self.hovered.is_some() {
            response.ctx.set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        if response.clicked() {
            if let Some(index) = response
                .interact_pointer_pos()
                .and_then(|pos| self.marker_at(pos, projection))
            {
                self.activated = Some(self.markers[index].id.clone());
                return true;
            }
        }

        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        for (i, marker) in self.markers.iter().enumerate() {
            let tip = projection.project(marker.pos);
            let rect = pin_rect(tip, self.size);
            if !painter.clip_rect().intersects(rect) {
                continue;
            }

            let head_radius = self.size * 0.3;
            let head = pos2(rect.center().x, rect.min.y + head_radius + 1.0);
            let outline = Stroke::new(1.5, Color32::WHITE);

            painter.add(Shape::convex_polygon(
                vec![
                    head + vec2(-head_radius * 0.8, head_radius * 0.6),
                    head + vec2(head_radius * 0.8, head_radius * 0.6),
                    tip,
                ],
                self.fill,
                Stroke::NONE,
            ));
            painter.circle(head, head_radius, self.fill, outline);

            // A small building glyph inside the head.
            let w = head_radius * 0.9;
            painter.rect_filled(
                egui::Rect::from_center_size(head + vec2(0.0, w * 0.15), vec2(w, w * 0.9)),
                1.0,
                Color32::WHITE,
            );

            if self.hovered == Some(i) {
                painter.text(
                    pos2(rect.center().x, rect.min.y - 4.0),
                    Align2::CENTER_BOTTOM,
                    &marker.label,
                    FontId::proportional(14.0),
                    Color32::BLACK,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Rect;

    fn catalog() -> Catalog {
        Catalog::from_json(
            br#"[
                {"id": 1, "coords": [41.55, -8.42], "modelUrl": "a.glb", "name": "Library"},
                {"id": "2", "coords": [41.56, -8.40], "modelUrl": "b.glb"}
            ]"#,
            "models.json",
        )
        .unwrap()
    }

    #[test]
    fn one_marker_per_record() {
        let layer = MarkerLayer::from_catalog(&catalog(), 48.0);

        assert_eq!(layer.markers().len(), 2);
        assert_eq!(layer.markers()[0].id.as_str(), "1");
        assert_eq!(layer.markers()[0].pos, GeoPos::from_lat_lon(41.55, -8.42));
        assert_eq!(layer.markers()[0].label, "Library");
        assert_eq!(layer.markers()[1].label, "Building 2");
    }

    #[test]
    fn marker_hit_test_uses_icon_area() {
        let layer = MarkerLayer::from_catalog(&catalog(), 48.0);
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(800.0, 600.0));
        let projection = MapProjection::new(18, GeoPos::from_lat_lon(41.55, -8.42), rect);

        // The first marker sits at the center, its icon extends upwards.
        let center = rect.center();
        assert_eq!(layer.marker_at(center - vec2(0.0, 20.0), &projection), Some(0));
        assert_eq!(layer.marker_at(center + vec2(0.0, 20.0), &projection), None);
    }

    #[test]
    fn take_activated_clears() {
        let mut layer = MarkerLayer::from_catalog(&catalog(), 48.0);
        layer.activated = Some(LocationId::from("1"));

        assert_eq!(layer.take_activated(), Some(LocationId::from("1")));
        assert_eq!(layer.take_activated(), None);
    }

    #[test]
    fn marker_layer_as_any() {
        let layer = MarkerLayer::default();
        assert!(layer.as_any().is::<MarkerLayer>());
    }
}
