use std::sync::Arc;

use egui::{Align2, Color32, RichText};
use log::{info, warn};
use poll_promise::Promise;

use crate::catalog::{Catalog, LocationId};
use crate::config::{MapDefaults, TileServerConfig};
use crate::geolocation::{GeolocationError, GeolocationProvider, Position, PositionOptions};
use crate::layers::marker::MarkerLayer;
use crate::layers::position::{LocatedPosition, PositionLayer};
use crate::map::{Map, MapViewport};
use crate::projection::{GeoPos, zoom_to_fit};
use crate::router::Route;
use crate::views::ViewContext;

const MARKERS: &str = "markers";
const POSITION: &str = "position";

const DISCLAIMER: &str = "Prototype: models are placed from GPS and compass readings and may \
                          appear several meters away from the real building.";
const INSTRUCTIONS: &str = "Select a building marker to see its model in augmented reality.";

/// State of the "Center on me" control.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocateControl {
    /// Not used yet.
    Idle,
    /// Waiting for a position.
    Locating,
    /// The user was found at this position.
    Located(GeoPos),
    /// Locating failed.
    Unavailable,
}

impl LocateControl {
    /// Whether the control can be clicked.
    pub fn enabled(&self) -> bool {
        matches!(self, LocateControl::Idle | LocateControl::Located(_))
    }

    /// Tooltip of the control.
    pub fn title(&self) -> &'static str {
        match self {
            LocateControl::Idle | LocateControl::Located(_) => "Center on Me",
            LocateControl::Locating => "Locating...",
            LocateControl::Unavailable => "Location unavailable",
        }
    }
}

/// The map of all buildings.
pub struct MapView {
    map: Map,
    provider: Arc<dyn GeolocationProvider>,
    options: PositionOptions,
    defaults: MapDefaults,
    locating: Option<Promise<Result<Position, GeolocationError>>>,
    control: LocateControl,
    view_points: f32,
}

impl MapView {
    /// Builds the map with one marker per building, at the remembered view if there is one.
    pub fn new(
        catalog: &Catalog,
        tiles: TileServerConfig,
        defaults: MapDefaults,
        remembered: Option<MapViewport>,
        provider: Arc<dyn GeolocationProvider>,
        options: PositionOptions,
    ) -> Self {
        let mut map = Map::new(tiles);
        if let Some(viewport) = remembered {
            map.set_view(viewport.center, viewport.zoom);
        }
        map.add_layer(MARKERS, MarkerLayer::from_catalog(catalog, defaults.marker_size));
        map.add_layer(POSITION, PositionLayer::default());

        Self {
            map,
            provider,
            options,
            defaults,
            locating: None,
            control: LocateControl::Idle,
            view_points: 512.0,
        }
    }

    /// The map widget.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Mutable access to the map widget.
    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    /// The current center and zoom.
    pub fn viewport(&self) -> MapViewport {
        self.map.viewport()
    }

    /// State of the "Center on me" control.
    pub fn locate_control(&self) -> LocateControl {
        self.control
    }

    /// Remembers the current view and opens the AR view of `id`.
    pub fn on_marker_activate(&mut self, id: &LocationId, cx: &mut ViewContext<'_>) {
        *cx.remembered = Some(self.viewport());
        cx.router.navigate_to(&Route::ArView(id.clone()));
    }

    /// Requests the user's position once. The result is applied by [`MapView::poll`].
    pub fn locate_me(&mut self) {
        if self.locating.is_some() {
            return;
        }
        info!("Locating user");
        self.control = LocateControl::Locating;
        self.locating = Some(self.provider.current_position(&self.options));
    }

    /// Applies a finished position request.
    pub fn poll(&mut self) {
        let Some(promise) = self.locating.take() else {
            return;
        };
        match promise.try_take() {
            Ok(Ok(position)) => self.on_location_found(&position),
            Ok(Err(e)) => self.on_location_error(&e),
            Err(promise) => self.locating = Some(promise),
        }
    }

    fn on_location_found(&mut self, position: &Position) {
        let pos = position.geo_pos();
        let accuracy = position.accuracy.unwrap_or(0.0);
        let zoom = zoom_to_fit(
            2.0 * accuracy,
            pos.lat,
            self.view_points,
            self.defaults.locate_max_zoom,
        );
        info!(
            "Located user at {:.5}, {:.5} (accuracy {:.0} m)",
            pos.lat, pos.lon, accuracy
        );

        self.map.set_view(pos, zoom);
        if let Some(layer) = self.map.layer_mut::<PositionLayer>(POSITION) {
            layer.set(LocatedPosition { pos, accuracy });
        }
        self.control = LocateControl::Located(pos);
    }

    fn on_location_error(&mut self, error: &GeolocationError) {
        warn!("Location failed: {}", error);
        self.map
            .set_view(self.defaults.fallback_center, self.defaults.fallback_zoom);
        if let Some(layer) = self.map.layer_mut::<PositionLayer>(POSITION) {
            layer.clear();
        }
        self.control = LocateControl::Unavailable;
    }

    /// Draws the banner, the map and its controls.
    pub fn ui(&mut self, ui: &mut egui::Ui, cx: &mut ViewContext<'_>) {
        self.poll();

        egui::Frame::NONE
            .fill(Color32::from_rgb(255, 243, 205))
            .inner_margin(egui::Margin::symmetric(8, 4))
            .show(ui, |ui| {
                ui.label(RichText::new(DISCLAIMER).color(Color32::from_rgb(102, 77, 3)));
            });
        ui.label(INSTRUCTIONS);

        let response = ui.add(&mut self.map);
        self.view_points = response.rect.width().min(response.rect.height());

        egui::Area::new(ui.id().with("locate_control"))
            .fixed_pos(response.rect.right_top())
            .pivot(Align2::RIGHT_TOP)
            .show(ui.ctx(), |ui| {
                let button = ui
                    .add_enabled(self.control.enabled(), egui::Button::new("⌖"))
                    .on_hover_text(self.control.title())
                    .on_disabled_hover_text(self.control.title());
                if button.clicked() {
                    match self.control {
                        LocateControl::Located(pos) => {
                            let zoom = self.map.zoom;
                            self.map.set_view(pos, zoom);
                        }
                        _ => self.locate_me(),
                    }
                }
            });

        if self.locating.is_some() {
            ui.ctx().request_repaint();
        }

        let activated = self
            .map
            .layer_mut::<MarkerLayer>(MARKERS)
            .and_then(MarkerLayer::take_activated);
        if let Some(id) = activated {
            self.on_marker_activate(&id, cx);
        }
    }
}
