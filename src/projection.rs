//! Map projection.

use egui::Rect;
use serde::{Deserialize, Serialize};

/// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;

/// Equatorial circumference based ground resolution of zoom level 0, in meters per pixel.
const METERS_PER_PIXEL_Z0: f64 = 156_543.033_92;

/// A geographical position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPos {
    /// Creates a position from a `(latitude, longitude)` pair, the order used by the catalog.
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<(f64, f64)> for GeoPos {
    /// Converts a `(longitude, latitude)` tuple.
    fn from((lon, lat): (f64, f64)) -> Self {
        Self { lon, lat }
    }
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection`.
    pub(crate) fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> egui::Pos2 {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE as f64;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }

    /// Converts a ground distance at the given latitude into screen points.
    pub fn meters_to_points(&self, meters: f64, lat: f64) -> f32 {
        (meters / meters_per_pixel(lat, self.zoom)) as f32
    }
}

/// Ground resolution at a latitude and zoom level.
pub(crate) fn meters_per_pixel(lat: f64, zoom: u8) -> f64 {
    METERS_PER_PIXEL_Z0 * lat.to_radians().cos() / 2.0_f64.powi(zoom as i32)
}

/// The largest zoom level up to `max_zoom` at which `meters` fit into `points` at a latitude.
pub(crate) fn zoom_to_fit(meters: f64, lat: f64, points: f32, max_zoom: u8) -> u8 {
    (0..=max_zoom)
        .rev()
        .find(|&zoom| meters / meters_per_pixel(lat, zoom) <= points as f64)
        .unwrap_or(0)
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    const EPSILON: f64 = 1e-9;

    #[test]
    fn coord_conversion_roundtrip_braga() {
        let zoom: u8 = 18;
        let (lon, lat) = (-8.288615, 41.453149);

        let final_lon = x_to_lon(lon_to_x(lon, zoom), zoom);
        let final_lat = y_to_lat(lat_to_y(lat, zoom), zoom);

        assert!((lon - final_lon).abs() < EPSILON);
        assert!((lat - final_lat).abs() < EPSILON);
    }

    #[test]
    fn lat_to_y_known_values() {
        // lat, zoom, expected_y
        let test_cases = vec![
            (0.0, 0, 0.5),
            (0.0, 8, 128.0),
            (85.0511287798, 0, 0.0),
            (-85.0511287798, 8, 256.0),
            (51.5074, 8, 85.12653378959828),
        ];

        for (lat, zoom, expected_y) in test_cases {
            assert!((lat_to_y(lat, zoom) - expected_y).abs() < EPSILON);
        }
    }

    #[test]
    fn lon_to_x_known_values() {
        // lon, zoom, expected_x
        let test_cases = vec![
            (0.0, 0, 0.5),
            (-180.0, 8, 0.0),
            (180.0, 8, 256.0),
            (-0.1275, 8, 127.90933333333333),
        ];

        for (lon, zoom, expected_x) in test_cases {
            assert!((lon_to_x(lon, zoom) - expected_x).abs() < EPSILON);
        }
    }

    #[test]
    fn project_center_is_widget_center() {
        let rect = Rect::from_min_size(pos2(10.0, 20.0), vec2(400.0, 300.0));
        let center = GeoPos::from_lat_lon(41.453149, -8.288615);
        let projection = MapProjection::new(18, center, rect);

        let screen = projection.project(center);
        assert!((screen - rect.center()).length() < 1e-3);

        let back = projection.unproject(rect.center());
        assert!((back.lon - center.lon).abs() < 1e-6);
        assert!((back.lat - center.lat).abs() < 1e-6);
    }

    #[test]
    fn meters_to_points_scales_with_zoom() {
        let rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(100.0, 100.0));
        let low = MapProjection::new(10, GeoPos::default(), rect);
        let high = MapProjection::new(11, GeoPos::default(), rect);

        let a = low.meters_to_points(1000.0, 0.0);
        let b = high.meters_to_points(1000.0, 0.0);
        assert!((b / a - 2.0).abs() < 1e-4);
    }

    #[test]
    fn geo_pos_from_lat_lon_keeps_order() {
        let pos = GeoPos::from_lat_lon(41.55, -8.42);
        assert_eq!(pos.lat, 41.55);
        assert_eq!(pos.lon, -8.42);
        assert_eq!(GeoPos::from((-8.42, 41.55)), pos);
    }

    #[test]
    fn zoom_to_fit_is_capped() {
        assert_eq!(zoom_to_fit(20.0, 0.0, 500.0, 14), 14);
        assert_eq!(zoom_to_fit(200_000.0, 0.0, 500.0, 14), 8);
        assert_eq!(zoom_to_fit(1e12, 0.0, 500.0, 14), 0);
    }
}
