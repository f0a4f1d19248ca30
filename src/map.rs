//! The slippy map widget used by the map view.
//!
//! Tiles are downloaded on worker threads and cached for the lifetime of the widget. Layers are
//! drawn on top of the tiles in key order and get the first chance to handle input.

use egui::{Color32, Rect, Response, Sense, Ui, Vec2, Widget, pos2};
use eyre::{Context, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::projection::{GeoPos, MapProjection, TILE_SIZE, lat_to_y, lon_to_x, x_to_lon, y_to_lat};

/// The minimum zoom level.
pub const MIN_ZOOM: u8 = 0;
/// The maximum zoom level.
pub const MAX_ZOOM: u8 = 19;

// Reuse the reqwest client for all tile downloads by making it a static variable.
pub(crate) static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .unwrap_or_default()
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// Center and zoom of a map, remembered across view changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapViewport {
    /// The geographical center.
    pub center: GeoPos,
    /// The zoom level.
    pub zoom: u8,
}

/// The map widget.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    tiles: HashMap<TileId, Tile>,

    layers: BTreeMap<String, Box<dyn Layer>>,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    config: Box<dyn MapConfig>,
}

impl Map {
    /// Creates a new `Map` widget centered on the configuration's default view.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            tiles: HashMap::new(),
            layers: BTreeMap::new(),
            mouse_pos: None,
            config: Box::new(config),
            center,
            zoom,
        }
    }

    /// Adds a layer under `key`, replacing any layer already stored there.
    pub fn add_layer(&mut self, key: impl Into<String>, layer: impl Layer) {
        self.layers.insert(key.into(), Box::new(layer));
    }

    /// Looks up a layer by key and concrete type.
    pub fn layer_mut<L: Layer>(&mut self, key: &str) -> Option<&mut L> {
        self.layers
            .get_mut(key)
            .and_then(|layer| layer.as_any_mut().downcast_mut::<L>())
    }

    /// The current center and zoom.
    pub fn viewport(&self) -> MapViewport {
        MapViewport {
            center: self.center,
            zoom: self.zoom,
        }
    }

    /// Moves the map to `center` at `zoom`.
    pub fn set_view(&mut self, center: GeoPos, zoom: u8) {
        self.center = center;
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Handles user input for panning and zooming.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        // Handle panning
        if response.dragged() {
            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

            let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            // Clamp the new center to the map boundaries.
            let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
            let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
            let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

            let min_center_x = view_size_in_tiles_x / 2.0;
            let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
            let min_center_y = view_size_in_tiles_y / 2.0;
            let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

            // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
            new_center_x = if min_center_x > max_center_x {
                world_size_in_tiles / 2.0
            } else {
                new_center_x.clamp(min_center_x, max_center_x)
            };
            new_center_y = if min_center_y > max_center_y {
                world_size_in_tiles / 2.0
            } else {
                new_center_y.clamp(min_center_y, max_center_y)
            };

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, self.zoom),
                lat: y_to_lat(new_center_y, self.zoom),
            };
        }

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom = (self.zoom + 1).clamp(MIN_ZOOM, MAX_ZOOM);

                if new_zoom != self.zoom {
                    let target = self.projection(*rect).unproject(pointer_pos);
                    self.zoom = new_zoom;
                    self.center = target;
                }
            }
        }

        // Handle zooming and mouse position
        let Some(mouse_pos) = response.hover_pos().filter(|_| response.hovered()) else {
            self.mouse_pos = None;
            return;
        };

        let mouse_rel = mouse_pos - rect.min;
        let widget_center_x = rect.width() as f64 / 2.0;
        let widget_center_y = rect.height() as f64 / 2.0;
        let target = self.projection(*rect).unproject(mouse_pos);
        self.mouse_pos = Some(target);

        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll == 0.0 {
            return;
        }

        let old_zoom = self.zoom;
        let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
            .clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;

        // If we are zooming out, check if the new zoom level is valid.
        if scroll < 0.0 {
            let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
            // If the world size would become smaller than the widget size, reject the zoom.
            if world_pixel_size < rect.width() as f64 || world_pixel_size < rect.height() as f64 {
                new_zoom = old_zoom;
            }
        }

        if new_zoom != old_zoom {
            self.zoom = new_zoom;

            // Keep the geo-coordinate under the mouse where it is.
            let new_target_x = lon_to_x(target.lon, new_zoom);
            let new_target_y = lat_to_y(target.lat, new_zoom);

            let new_center_x =
                new_target_x - (mouse_rel.x as f64 - widget_center_x) / TILE_SIZE as f64;
            let new_center_y =
                new_target_y - (mouse_rel.y as f64 - widget_center_y) / TILE_SIZE as f64;

            self.center = GeoPos {
                lon: x_to_lon(new_center_x, new_zoom),
                lat: y_to_lat(new_center_y, new_zoom),
            };
        }
    }

    fn projection(&self, rect: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, rect)
    }

    /// Returns the visible tiles and their screen positions.
    fn visible_tiles(&self, rect: &Rect) -> Vec<(TileId, egui::Pos2)> {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let widget_center_x = rect.width() / 2.0;
        let widget_center_y = rect.height() / 2.0;

        let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i64;
        let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i64;
        let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i64;
        let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i64;

        // Tiles outside the world do not exist.
        let last = (1_i64 << self.zoom) - 1;

        let mut tiles = Vec::new();
        for x in x_min.max(0)..=x_max.min(last) {
            for y in y_min.max(0)..=y_max.min(last) {
                let tile_id = TileId {
                    z: self.zoom,
                    x: x as u32,
                    y: y as u32,
                };
                let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
                let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
                tiles.push((tile_id, rect.min + Vec2::new(screen_x, screen_y)));
            }
        }
        tiles
    }

    /// Starts the download of a tile unless it is already cached.
    fn load_tile(&mut self, tile_id: TileId) {
        let config = self.config.as_ref();
        self.tiles.entry(tile_id).or_insert_with(|| {
            let url = config.tile_url(&tile_id);
            Tile::Loading(Promise::spawn_thread("download_tile", move || {
                download_tile(&url)
                    .with_context(|| format!("Failed to download tile from {}", &url))
                    .map_err(Arc::new)
            }))
        });
    }

    /// Moves finished downloads into textures.
    fn poll_tile(&mut self, ui: &Ui, tile_id: TileId) {
        let Some(tile_state) = self.tiles.get_mut(&tile_id) else {
            return;
        };

        if let Tile::Loading(promise) = tile_state {
            if let Some(result) = promise.ready() {
                match result {
                    Ok(color_image) => {
                        let texture = ui.ctx().load_texture(
                            format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                            color_image.clone(),
                            Default::default(),
                        );
                        *tile_state = Tile::Loaded(texture);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        *tile_state = Tile::Failed(e.clone());
                    }
                }
            }
        }
    }

    /// Draws a single map tile.
    fn draw_tile(&self, ui: &Ui, painter: &egui::Painter, tile_id: TileId, tile_pos: egui::Pos2) {
        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match self.tiles.get(&tile_id) {
            Some(Tile::Loaded(texture)) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            Some(Tile::Failed(e)) => {
                draw_placeholder(painter, tile_rect, "!", Color32::RED);
                let response = ui.interact(tile_rect, ui.id().with(tile_id), Sense::hover());
                response.on_hover_text(format!("{}", e));
            }
            Some(Tile::Loading(_)) | None => {
                draw_placeholder(painter, tile_rect, "?", Color32::ORANGE);
                // The tile is still loading, so we need to tell egui to repaint.
                ui.ctx().request_repaint();
            }
        }
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        let Some(attribution) = self.config.attribution() else {
            return;
        };

        let bg_color = if ui.visuals().dark_mode {
            Color32::from_black_alpha(150)
        } else {
            Color32::from_white_alpha(150)
        };

        let frame = egui::Frame::NONE
            .inner_margin(egui::Margin::same(5))
            .fill(bg_color)
            .corner_radius(3.0);

        egui::Area::new(ui.id().with("attribution"))
            .fixed_pos(rect.left_bottom())
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
            .show(ui.ctx(), |ui| {
                frame.show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                    ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend);

                    if let Some(url) = self.config.attribution_url() {
                        ui.hyperlink_to(attribution, url);
                    } else {
                        ui.label(attribution);
                    }
                });
            });
    }
}

fn download_tile(url: &str) -> Result<egui::ColorImage, MapError> {
    debug!("Downloading tile from {}", url);
    let response = CLIENT.get(url).send()?;

    if !response.status().is_success() {
        return Err(MapError::TileDownloadError(response.status().to_string()));
    }

    let bytes = response.bytes()?.to_vec();
    let image = image::load_from_memory(&bytes)?.to_rgba8();

    let size = [image.width() as _, image.height() as _];
    let pixels = image.into_raw();
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
}

fn draw_placeholder(painter: &egui::Painter, tile_rect: Rect, glyph: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        glyph,
        egui::FontId::proportional(40.0),
        color,
    );
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));

        let projection = self.projection(rect);
        let mut consumed = false;
        for layer in self.layers.values_mut() {
            if layer.handle_input(&response, &projection) {
                consumed = true;
                break;
            }
        }
        if !consumed {
            self.handle_input(ui, &rect, &response);
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, Color32::from_rgb(220, 220, 220));

        let visible_tiles = self.visible_tiles(&rect);
        for (tile_id, tile_pos) in &visible_tiles {
            self.load_tile(*tile_id);
            self.poll_tile(ui, *tile_id);
            self.draw_tile(ui, &painter, *tile_id, *tile_pos);
        }

        let projection = self.projection(rect);
        for layer in self.layers.values() {
            layer.draw(&painter, &projection);
        }

        self.draw_attribution(ui, &rect);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TileServerConfig;
    use crate::layers::position::PositionLayer;

    #[test]
    fn map_new_uses_config_defaults() {
        let config = TileServerConfig::default();
        let default_center = config.default_center();
        let default_zoom = config.default_zoom();

        let map = Map::new(config);

        assert_eq!(map.center, default_center);
        assert_eq!(map.zoom, default_zoom);
        assert!(map.mouse_pos.is_none());
        assert!(map.tiles.is_empty());
        assert!(map.layers.is_empty());
    }

    #[test]
    fn set_view_clamps_zoom() {
        let mut map = Map::new(TileServerConfig::default());
        let center = GeoPos::from_lat_lon(51.505, -0.09);
        map.set_view(center, 42);

        assert_eq!(
            map.viewport(),
            MapViewport {
                center,
                zoom: MAX_ZOOM
            }
        );
    }

    #[test]
    fn visible_tiles_stay_inside_world() {
        let mut map = Map::new(TileServerConfig::default());
        map.set_view(GeoPos::default(), 1);
        let rect = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(1024.0, 1024.0));

        let tiles = map.visible_tiles(&rect);

        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|(id, _)| id.x <= 1 && id.y <= 1 && id.z == 1));
    }

    #[test]
    fn layer_lookup_by_type() {
        let mut map = Map::new(TileServerConfig::default());
        map.add_layer("position", PositionLayer::default());

        assert!(map.layer_mut::<PositionLayer>("position").is_some());
        assert!(map.layer_mut::<PositionLayer>("missing").is_none());
    }
}
