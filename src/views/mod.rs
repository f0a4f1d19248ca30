//! The screens of the application. Exactly one is shown at a time.

use crate::map::MapViewport;
use crate::notice::Notices;
use crate::router::Router;

/// The AR view of one building.
pub mod ar_view;
/// The map of all buildings.
pub mod map_view;
/// The page for unknown routes.
pub mod not_found;

pub use ar_view::ArView;
pub use map_view::{LocateControl, MapView};
pub use not_found::NotFoundView;

/// Application state a view may change while it is shown.
pub struct ViewContext<'a> {
    /// Navigation.
    pub router: &'a mut Router,
    /// Messages for the user.
    pub notices: &'a mut Notices,
    /// The map view to restore when returning to the map.
    pub remembered: &'a mut Option<MapViewport>,
}

/// The screen currently shown.
pub enum View {
    /// The catalog is still being fetched.
    Loading,
    /// The map of all buildings.
    Map(Box<MapView>),
    /// One building in AR.
    Ar(Box<ArView>),
    /// Unknown route or failed catalog.
    NotFound(NotFoundView),
}

impl View {
    /// Draws the view.
    pub fn ui(&mut self, ui: &mut egui::Ui, cx: &mut ViewContext<'_>) {
        match self {
            View::Loading => {
                ui.centered_and_justified(|ui| {
                    ui.spinner();
                });
            }
            View::Map(view) => view.ui(ui, cx),
            View::Ar(view) => view.ui(ui, cx),
            View::NotFound(view) => view.ui(ui, cx),
        }
    }

    /// A short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            View::Loading => "loading",
            View::Map(_) => "map",
            View::Ar(_) => "ar",
            View::NotFound(_) => "not found",
        }
    }
}
