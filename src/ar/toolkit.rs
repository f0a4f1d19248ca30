//! Anchoring the AR scene to the world through GPS.
//!
//! [`LocationBased`] places the world origin at the first GPS fix and uses spherical mercator
//! meters as world units: `+X` is east and `-Z` is north. Each later fix moves the camera, so
//! models added at a longitude and latitude stay where they belong while the user walks.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::ar::camera::PerspectiveCamera;
use crate::ar::model::Model;
use crate::geolocation::{
    GeoEvent, GeolocationError, GeolocationProvider, Position, PositionOptions, Watch,
};

/// Earth radius of the spherical mercator projection, in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Projects a longitude and latitude in degrees to spherical mercator meters.
pub fn spherical_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Great circle distance between two points in degrees, in meters.
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Messages of an AR toolkit.
#[derive(Clone, Debug, PartialEq)]
pub enum ArEvent {
    /// The camera was moved to a new fix. Repeats on every accepted fix.
    GpsUpdate {
        /// The fix.
        position: Position,
        /// Meters moved since the previous accepted fix, zero for the first one.
        distance_moved: f64,
    },
    /// A fix failed. Updates continue.
    GpsError(GeolocationError),
}

/// GPS driven world anchoring.
pub trait ArToolkit {
    /// Starts following the device position.
    fn start_gps(&mut self) -> Result<(), GeolocationError>;

    /// Stops following the device position.
    fn stop_gps(&mut self);

    /// Applies the fixes that arrived since the last call to `camera`.
    fn poll(&mut self, camera: &mut PerspectiveCamera) -> Vec<ArEvent>;

    /// Anchors `model` at a longitude and latitude. Its height is kept.
    fn add(&mut self, model: Model, lon: f64, lat: f64);

    /// The anchored models.
    fn objects(&self) -> &[Model];
}

/// Location based AR on top of a [`GeolocationProvider`].
pub struct LocationBased {
    provider: Arc<dyn GeolocationProvider>,
    options: PositionOptions,
    watch: Option<Watch>,
    /// Mercator meters of the world origin.
    origin: Option<(f64, f64)>,
    last_fix: Option<(f64, f64)>,
    min_distance: f64,
    min_accuracy: f64,
    objects: Vec<Model>,
    queued: Vec<(Model, f64, f64)>,
}

impl LocationBased {
    /// Creates a toolkit that reports moves of at least `min_distance` meters and ignores fixes
    /// less accurate than `min_accuracy` meters.
    pub fn new(
        provider: Arc<dyn GeolocationProvider>,
        options: PositionOptions,
        min_distance: f64,
        min_accuracy: f64,
    ) -> Self {
        Self {
            provider,
            options,
            watch: None,
            origin: None,
            last_fix: None,
            min_distance,
            min_accuracy,
            objects: Vec::new(),
            queued: Vec::new(),
        }
    }

    /// World `x` and `z` of a longitude and latitude, once the origin is known.
    pub fn lon_lat_to_world(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (ox, oy) = self.origin?;
        let (x, y) = spherical_mercator(lon, lat);
        Some((x - ox, -(y - oy)))
    }

    fn place(&mut self, mut model: Model, lon: f64, lat: f64) {
        match self.lon_lat_to_world(lon, lat) {
            Some((x, z)) => {
                model.position.x = x;
                model.position.z = z;
                debug!("Anchored {} at world ({:.2}, {:.2})", model.source, x, z);
                self.objects.push(model);
            }
            None => self.queued.push((model, lon, lat)),
        }
    }

    fn accept(&mut self, position: Position, camera: &mut PerspectiveCamera) -> Option<ArEvent> {
        if position.accuracy.is_some_and(|accuracy| accuracy > self.min_accuracy) {
            debug!("Ignoring fix with accuracy {:?}", position.accuracy);
            return None;
        }

        let distance_moved = match self.last_fix {
            Some((lon, lat)) => {
                haversine_distance(lon, lat, position.longitude, position.latitude)
            }
            None => 0.0,
        };
        if self.last_fix.is_some() && distance_moved < self.min_distance {
            return None;
        }

        if self.origin.is_none() {
            self.origin = Some(spherical_mercator(position.longitude, position.latitude));
            info!(
                "World origin set at {:.6}, {:.6}",
                position.latitude, position.longitude
            );
            for (model, lon, lat) in std::mem::take(&mut self.queued) {
                self.place(model, lon, lat);
            }
        }

        if let Some((x, z)) = self.lon_lat_to_world(position.longitude, position.latitude) {
            camera.position.x = x;
            camera.position.z = z;
        }
        self.last_fix = Some((position.longitude, position.latitude));

        Some(ArEvent::GpsUpdate {
            position,
            distance_moved,
        })
    }
}

impl ArToolkit for LocationBased {
    fn start_gps(&mut self) -> Result<(), GeolocationError> {
        if self.watch.is_none() {
            self.watch = Some(self.provider.watch_position(&self.options)?);
            info!("GPS started");
        }
        Ok(())
    }

    fn stop_gps(&mut self) {
        if self.watch.take().is_some() {
            info!("GPS stopped");
        }
    }

    fn poll(&mut self, camera: &mut PerspectiveCamera) -> Vec<ArEvent> {
        let Some(watch) = &self.watch else {
            return Vec::new();
        };

        let (events, open) = watch.drain();
        if !open {
            warn!("GPS provider stopped sending updates");
            self.watch = None;
        }

        events
            .into_iter()
            .filter_map(|event| match event {
                GeoEvent::Fix(position) => self.accept(position, camera),
                GeoEvent::Error(e) => Some(ArEvent::GpsError(e)),
            })
            .collect()
    }

    fn add(&mut self, model: Model, lon: f64, lat: f64) {
        self.place(model, lon, lat);
    }

    fn objects(&self) -> &[Model] {
        &self.objects
    }
}
