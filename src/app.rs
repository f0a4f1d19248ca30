//! The application shell: catalog loading, routing between views and the position panel.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use poll_promise::Promise;

use crate::ar::{ArBackends, ArSession};
use crate::catalog::{Catalog, CatalogLoadError, LocationId, spawn_fetch};
use crate::config::AppConfig;
use crate::geolocation::{GeolocationProvider, GeolocationWatcher, provider_from_config};
use crate::map::MapViewport;
use crate::notice::Notices;
use crate::router::{Route, Router};
use crate::views::{ArView, MapView, NotFoundView, View, ViewContext};

type CatalogPromise = Promise<Result<Catalog, CatalogLoadError>>;

/// The platform services the application runs on.
pub struct Platform {
    /// Position fixes for the panel, the map and the AR view.
    pub geolocation: Arc<dyn GeolocationProvider>,
    /// Starts fetching the catalog from a source.
    pub fetch_catalog: Box<dyn Fn(&str) -> CatalogPromise>,
    /// Builds the collaborators of a new AR session.
    pub ar_backends: Box<dyn Fn(&AppConfig) -> ArBackends>,
}

impl Platform {
    /// The services described by the configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let geolocation = provider_from_config(&config.geolocation.source);
        let provider = geolocation.clone();
        Self {
            geolocation,
            fetch_catalog: Box::new(spawn_fetch),
            ar_backends: Box::new(move |config: &AppConfig| {
                ArBackends::from_config(&config.ar, provider.clone(), config.geolocation.options())
            }),
        }
    }
}

enum CatalogState {
    Loading(CatalogPromise),
    Ready(Catalog),
    Failed,
}

/// The application.
pub struct App {
    config: AppConfig,
    platform: Platform,
    catalog: CatalogState,
    router: Router,
    remembered: Option<MapViewport>,
    watcher: GeolocationWatcher,
    notices: Notices,
    view: View,
}

impl App {
    /// Starts fetching the catalog and watching the position.
    pub fn new(config: AppConfig, platform: Platform, initial_hash: impl Into<String>) -> Self {
        let catalog = CatalogState::Loading((platform.fetch_catalog)(&config.catalog_source));
        let watcher =
            GeolocationWatcher::start(platform.geolocation.as_ref(), &config.geolocation.options());

        Self {
            config,
            platform,
            catalog,
            router: Router::new(initial_hash),
            remembered: None,
            watcher,
            notices: Notices::default(),
            view: View::Loading,
        }
    }

    /// The view shown.
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Navigation.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// The map view restored when returning to the map.
    pub fn remembered_viewport(&self) -> Option<MapViewport> {
        self.remembered
    }

    /// The position watcher.
    pub fn watcher(&self) -> &GeolocationWatcher {
        &self.watcher
    }

    /// Messages for the user.
    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Advances everything that does not need the screen: the catalog fetch, routing, the
    /// position watcher and the AR session.
    pub fn step(&mut self) {
        self.watcher.poll();
        self.poll_catalog();

        match &self.catalog {
            CatalogState::Loading(_) => {}
            CatalogState::Failed => {
                // Without a catalog there is nothing to route to.
                if !matches!(self.view, View::NotFound(_)) {
                    self.view = View::NotFound(NotFoundView);
                }
                self.router.poll();
            }
            CatalogState::Ready(_) => {
                if let Some(route) = self.router.poll() {
                    self.transition(route);
                }
            }
        }

        if let View::Ar(view) = &mut self.view {
            view.session_mut().poll(&mut self.notices);
        }
    }

    fn poll_catalog(&mut self) {
        let CatalogState::Loading(promise) = &self.catalog else {
            return;
        };
        if promise.ready().is_none() {
            return;
        }

        let state = std::mem::replace(&mut self.catalog, CatalogState::Failed);
        let CatalogState::Loading(promise) = state else {
            return;
        };
        self.catalog = match promise.block_and_take() {
            Ok(catalog) => CatalogState::Ready(catalog),
            Err(e) => {
                error!("Failed to load the catalog: {}", e);
                CatalogState::Failed
            }
        };
    }

    fn transition(&mut self, route: Route) {
        // The old view is torn down before the new one starts.
        let old = std::mem::replace(&mut self.view, View::Loading);
        info!("Leaving {} view for {:?}", old.name(), route);
        drop(old);

        self.view = match route {
            Route::Home => self.map_view(),
            Route::ArView(id) => self.ar_view(&id),
            Route::NotFound => View::NotFound(NotFoundView),
        };
    }

    fn map_view(&self) -> View {
        let CatalogState::Ready(catalog) = &self.catalog else {
            return View::NotFound(NotFoundView);
        };
        View::Map(Box::new(MapView::new(
            catalog,
            self.config.tiles.clone(),
            self.config.map.clone(),
            self.remembered,
            self.platform.geolocation.clone(),
            self.config.geolocation.options(),
        )))
    }

    fn ar_view(&mut self, id: &LocationId) -> View {
        let CatalogState::Ready(catalog) = &self.catalog else {
            return View::NotFound(NotFoundView);
        };
        let Some(record) = catalog.find(id.as_str()) else {
            info!("No location with id {}", id);
            return View::NotFound(NotFoundView);
        };

        let model_url = catalog.model_url(record);
        let backends = (self.platform.ar_backends)(&self.config);
        let mut session = ArSession::new(record.clone(), model_url, &self.config.ar, backends);
        session.start(&mut self.notices);
        View::Ar(Box::new(ArView::new(session)))
    }

    fn position_panel(&self, ui: &mut egui::Ui) {
        let display = self.watcher.display();
        ui.horizontal_wrapped(|ui| {
            ui.label(&display.summary);
            ui.separator();
            egui::Grid::new("geo_position").num_columns(8).show(ui, |ui| {
                ui.label("Lat:");
                ui.monospace(&display.latitude);
                ui.label("Lon:");
                ui.monospace(&display.longitude);
                ui.label("Alt:");
                ui.monospace(&display.altitude);
                ui.label("Accuracy:");
                ui.monospace(&display.accuracy);
            });
        });
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.step();

        egui::TopBottomPanel::bottom("geo_panel").show(ctx, |ui| {
            self.position_panel(ui);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let mut cx = ViewContext {
                    router: &mut self.router,
                    notices: &mut self.notices,
                    remembered: &mut self.remembered,
                };
                self.view.ui(ui, &mut cx);
            });

        self.notices.show(ctx);

        // Catalog, position and locate results arrive on other threads.
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}
