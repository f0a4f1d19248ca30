#![warn(missing_docs)]

//! A map of building locations with an augmented reality view of their 3D models.
//!
//! The map view shows one marker per building of the catalog. Selecting a marker opens the AR
//! view, which anchors the building's model to its real-world coordinates from GPS fixes and
//! turns the camera with the device orientation. The current route lives in a location hash,
//! `#` for the map and `#/ar/<id>` for a building.
//!
//! # Example
//!
//! ```no_run
//! use bim_ar_viewer::app::{App, Platform};
//! use bim_ar_viewer::config::AppConfig;
//!
//! fn main() -> eframe::Result {
//!     let config = AppConfig::default();
//!     eframe::run_native(
//!         "BIM AR Viewer",
//!         eframe::NativeOptions::default(),
//!         Box::new(move |_cc| {
//!             let platform = Platform::from_config(&config);
//!             Ok(Box::new(App::new(config, platform, "#")))
//!         }),
//!     )
//! }
//! ```

pub mod app;
pub mod ar;
pub mod catalog;
pub mod config;
pub mod geolocation;
pub mod layers;
pub mod map;
pub mod notice;
pub mod projection;
pub mod router;
pub mod views;

pub use app::{App, Platform};
pub use map::{Map, MapViewport};
pub use projection::GeoPos;
