//! Application configuration.
//!
//! Everything has a default, so an empty JSON object is a valid configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, ensure};
use log::info;
use serde::{Deserialize, Serialize};

use crate::geolocation::PositionOptions;
use crate::map::TileId;
use crate::projection::GeoPos;

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;
}

/// A tile server addressed through a `{z}/{x}/{y}` URL template.
///
/// # Example
///
/// ```
/// use bim_ar_viewer::config::{MapConfig, TileServerConfig};
/// use bim_ar_viewer::map::TileId;
///
/// let config = TileServerConfig::default();
/// let url = config.tile_url(&TileId { z: 18, x: 124921, y: 96514 });
/// assert_eq!(url, "https://tile.openstreetmap.org/18/124921/96514.png");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileServerConfig {
    /// URL template, `{z}`, `{x}` and `{y}` are substituted.
    pub url_template: String,
    /// Attribution text shown in the lower left corner.
    pub attribution: Option<String>,
    /// Link target of the attribution.
    pub attribution_url: Option<String>,
    /// Where the map starts when no earlier view is remembered.
    pub default_center: GeoPos,
    /// Zoom level used when no earlier view is remembered.
    pub default_zoom: u8,
}

impl Default for TileServerConfig {
    fn default() -> Self {
        Self {
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: Some("© OpenStreetMap contributors".to_string()),
            attribution_url: Some("https://www.openstreetmap.org/copyright".to_string()),
            default_center: GeoPos::from_lat_lon(41.453149, -8.288615), // Guimarães, Portugal
            default_zoom: 18,
        }
    }
}

impl MapConfig for TileServerConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        self.url_template
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }

    fn attribution(&self) -> Option<&String> {
        self.attribution.as_ref()
    }

    fn attribution_url(&self) -> Option<&String> {
        self.attribution_url.as_ref()
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }
}

/// Map view behaviour that does not belong to the tile server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapDefaults {
    /// Center used when locating the user fails.
    pub fallback_center: GeoPos,
    /// Zoom used when locating the user fails.
    pub fallback_zoom: u8,
    /// Upper bound for the zoom level picked after locating the user.
    pub locate_max_zoom: u8,
    /// Edge length of the building marker icon, in points.
    pub marker_size: f32,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            fallback_center: GeoPos::from_lat_lon(51.505, -0.09),
            fallback_zoom: 13,
            locate_max_zoom: 14,
            marker_size: 48.0,
        }
    }
}

/// Where position fixes come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeolocationSource {
    /// The platform has no positioning capability.
    Unsupported,
    /// A fixed position, re-sent on an interval.
    Simulated {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
        /// Altitude in meters.
        #[serde(default)]
        altitude: Option<f64>,
        /// Horizontal accuracy in meters.
        #[serde(default = "default_simulated_accuracy")]
        accuracy: f64,
        /// Delay between fixes.
        #[serde(default = "default_simulated_interval")]
        interval_ms: u64,
    },
    /// NMEA 0183 sentences read from a file or serial device node.
    Nmea {
        /// Path of the device or log file.
        path: PathBuf,
    },
}

fn default_simulated_accuracy() -> f64 {
    5.0
}

fn default_simulated_interval() -> u64 {
    1000
}

impl Default for GeolocationSource {
    fn default() -> Self {
        let center = TileServerConfig::default().default_center;
        Self::Simulated {
            lat: center.lat,
            lon: center.lon,
            altitude: None,
            accuracy: default_simulated_accuracy(),
            interval_ms: default_simulated_interval(),
        }
    }
}

/// Geolocation request options and provider selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Ask the provider for its most accurate mode.
    pub high_accuracy: bool,
    /// Maximum age of a cached fix that may be returned, `0` disables caching.
    pub maximum_age_ms: u64,
    /// How long a single request may take before it fails with a timeout.
    pub timeout_ms: u64,
    /// The provider to use.
    pub source: GeolocationSource,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 20_000,
            source: GeolocationSource::default(),
        }
    }
}

impl GeolocationConfig {
    /// The request options described by this configuration.
    pub fn options(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: self.high_accuracy,
            maximum_age: Duration::from_millis(self.maximum_age_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Where the AR background comes from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraFeedSource {
    /// No camera, the background stays grey.
    #[default]
    None,
    /// A still image used in place of the camera stream.
    Image {
        /// Path of the image file.
        path: PathBuf,
    },
}

/// Parameters of the AR view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArConfig {
    /// Vertical field of view in degrees.
    pub fov: f64,
    /// Near clip plane distance.
    pub near: f64,
    /// Far clip plane distance.
    pub far: f64,
    /// Vertical offset applied to loaded models. The phone is held above the ground, so models
    /// are lowered.
    pub model_height_offset: f64,
    /// Rotation around the vertical axis applied to loaded models, in radians.
    pub model_rotation_y: f64,
    /// Intensity of the white ambient light.
    pub ambient_intensity: f32,
    /// Intensity of the directional light following the camera.
    pub sun_intensity: f32,
    /// Initial position of the directional light.
    pub sun_position: [f64; 3],
    /// Distance of the directional light behind the camera.
    pub sun_distance_behind: f64,
    /// Height of the directional light above the camera.
    pub sun_height_above: f64,
    /// Minimum distance in meters the device must move before another GPS update is reported.
    pub gps_min_distance: f64,
    /// Fixes with a worse accuracy than this, in meters, are ignored.
    pub gps_min_accuracy: f64,
    /// Background source.
    pub camera_feed: CameraFeedSource,
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            fov: 80.0,
            near: 0.001,
            far: 1000.0,
            model_height_offset: -2.8,
            model_rotation_y: -std::f64::consts::FRAC_PI_3,
            ambient_intensity: 0.5,
            sun_intensity: 2.0,
            sun_position: [0.0, 10.0, -10.0],
            sun_distance_behind: 10.0,
            sun_height_above: 5.0,
            gps_min_distance: 0.0,
            gps_min_accuracy: 1000.0,
            camera_feed: CameraFeedSource::default(),
        }
    }
}

/// The complete application configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// URL or file path of the building catalog JSON.
    pub catalog_source: String,
    /// Tile server used by the map view.
    pub tiles: TileServerConfig,
    /// Map view behaviour.
    pub map: MapDefaults,
    /// Geolocation options.
    pub geolocation: GeolocationConfig,
    /// AR view parameters.
    pub ar: ArConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_source: "models.json".to_string(),
            tiles: TileServerConfig::default(),
            map: MapDefaults::default(),
            geolocation: GeolocationConfig::default(),
            ar: ArConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        Self::validate(&config)
            .with_context(|| format!("Invalid configuration {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Rejects values the AR camera and the position providers cannot work with.
    pub fn validate(&self) -> Result<()> {
        let ar = &self.ar;
        ensure!(
            ar.fov > 0.0 && ar.fov < 180.0,
            "ar.fov must be between 0 and 180 degrees, got {}",
            ar.fov
        );
        ensure!(ar.near > 0.0, "ar.near must be positive, got {}", ar.near);
        ensure!(
            ar.far > ar.near,
            "ar.far ({}) must be greater than ar.near ({})",
            ar.far,
            ar.near
        );
        if let GeolocationSource::Simulated { interval_ms, .. } = &self.geolocation.source {
            ensure!(
                *interval_ms > 0,
                "geolocation.source.interval_ms must be at least 1"
            );
        }
        Ok(())
    }

    /// Reads a configuration file if one is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_server_default() {
        let config = TileServerConfig::default();
        assert_eq!(
            config.url_template,
            "https://tile.openstreetmap.org/{z}/{x}/{y}.png"
        );
        assert_eq!(config.default_center, GeoPos::from_lat_lon(41.453149, -8.288615));
        assert_eq!(config.default_zoom, 18);
    }

    #[test]
    fn tile_server_url_template() {
        let config = TileServerConfig {
            url_template: "https://tiles.example/{z}/{y}/{x}.png?key=abc".to_string(),
            ..Default::default()
        };
        let url = config.tile_url(&TileId { z: 10, x: 1, y: 2 });
        assert_eq!(url, "https://tiles.example/10/2/1.png?key=abc");
    }

    #[test]
    fn empty_object_is_default_config() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ar.fov, 80.0);
        assert_eq!(config.map.fallback_zoom, 13);
    }

    #[test]
    fn default_geolocation_options() {
        let options = GeolocationConfig::default().options();
        assert!(options.enable_high_accuracy);
        assert_eq!(options.maximum_age, Duration::ZERO);
        assert_eq!(options.timeout, Duration::from_secs(20));
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let json = r#"{
            "catalog_source": "https://example.org/models.json",
            "geolocation": { "timeout_ms": 5000, "source": { "kind": "nmea", "path": "/dev/ttyACM0" } },
            "ar": { "fov": 60.0, "camera_feed": { "kind": "image", "path": "street.jpg" } }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.catalog_source, "https://example.org/models.json");
        assert_eq!(config.geolocation.timeout_ms, 5000);
        assert!(config.geolocation.high_accuracy);
        assert_eq!(
            config.geolocation.source,
            GeolocationSource::Nmea {
                path: PathBuf::from("/dev/ttyACM0")
            }
        );
        assert_eq!(config.ar.fov, 60.0);
        assert_eq!(config.ar.near, 0.001);
        assert_eq!(
            config.ar.camera_feed,
            CameraFeedSource::Image {
                path: PathBuf::from("street.jpg")
            }
        );
    }

    #[test]
    fn simulated_source_fills_defaults() {
        let json = r#"{ "kind": "simulated", "lat": 41.55, "lon": -8.42 }"#;
        let source: GeolocationSource = serde_json::from_str(json).unwrap();
        assert_eq!(
            source,
            GeolocationSource::Simulated {
                lat: 41.55,
                lon: -8.42,
                altitude: None,
                accuracy: 5.0,
                interval_ms: 1000,
            }
        );
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn degenerate_clip_planes_are_rejected() {
        let mut config = AppConfig::default();
        config.ar.near = 5.0;
        config.ar.far = 5.0;
        assert!(config.validate().is_err());

        config.ar.near = 0.0;
        config.ar.far = 1000.0;
        assert!(config.validate().is_err());

        config.ar.near = 0.001;
        config.ar.fov = 180.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_simulated_interval_is_rejected() {
        let json = r#"{ "geolocation": { "source": { "kind": "simulated", "lat": 41.55, "lon": -8.42, "interval_ms": 0 } } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_rejects_invalid_values() {
        let path = std::env::temp_dir().join(format!(
            "bim-ar-viewer-invalid-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "ar": { "near": 1.0, "far": 1.0 } }"#).unwrap();
        let result = AppConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn load_missing_file_fails() {
        let path = std::env::temp_dir().join("bim-ar-viewer-missing-config.json");
        assert!(AppConfig::load(&path).is_err());
        assert!(AppConfig::load_or_default(None).is_ok());
    }
}
