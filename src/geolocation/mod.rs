//! Device position.
//!
//! A [`GeolocationProvider`] stands in for the platform's positioning service. Consumers
//! subscribe with [`GeolocationProvider::watch_position`] and receive [`GeoEvent`]s on a channel
//! until they drop the [`Watch`]. The [`GeolocationWatcher`] keeps the most recent fix and the
//! text shown in the position panel.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, SystemTime};

use log::{debug, error, warn};
use poll_promise::Promise;
use thiserror::Error;

use crate::config::GeolocationSource;
use crate::projection::GeoPos;

mod nmea;
mod simulated;

pub use nmea::NmeaProvider;
pub use simulated::SimulatedProvider;

/// Errors reported by a geolocation provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeolocationError {
    /// The platform has no positioning capability at all.
    #[error("Geolocation is not supported on this platform")]
    Unavailable,

    /// The user or the system refused access to the position.
    #[error("Permission to access the position was denied: {0}")]
    PermissionDenied(String),

    /// No position could be determined.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix arrived within the request timeout.
    #[error("Timed out after {0:?} waiting for a position")]
    Timeout(Duration),
}

/// A position fix.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above sea level in meters, if known.
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters, if known.
    pub accuracy: Option<f64>,
    /// When the fix was taken.
    pub timestamp: SystemTime,
}

impl Position {
    /// A fix taken now.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            timestamp: SystemTime::now(),
        }
    }

    /// The fix as a map position.
    pub fn geo_pos(&self) -> GeoPos {
        GeoPos::from_lat_lon(self.latitude, self.longitude)
    }
}

/// Options of a position request.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionOptions {
    /// Ask for the most accurate mode the provider has.
    pub enable_high_accuracy: bool,
    /// Maximum age of a cached fix, zero disables the cache.
    pub maximum_age: Duration,
    /// How long a request may take.
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(20),
        }
    }
}

/// One message on a watch channel.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoEvent {
    /// A new fix. Repeats for the lifetime of the watch.
    Fix(Position),
    /// A failed update. The watch stays active unless the provider closes the channel.
    Error(GeolocationError),
}

/// An active subscription to position updates. Dropping it ends the subscription.
#[derive(Debug)]
pub struct Watch {
    rx: Receiver<GeoEvent>,
}

impl Watch {
    /// Wraps the receiving end of a provider channel.
    pub fn new(rx: Receiver<GeoEvent>) -> Self {
        Self { rx }
    }

    /// Returns all events received since the last call, without blocking.
    ///
    /// The second value is `false` once the provider has closed the channel.
    pub fn drain(&self) -> (Vec<GeoEvent>, bool) {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, true),
                Err(TryRecvError::Disconnected) => return (events, false),
            }
        }
    }
}

/// A source of position fixes.
pub trait GeolocationProvider: Send + Sync {
    /// Starts a continuous subscription.
    fn watch_position(&self, options: &PositionOptions) -> Result<Watch, GeolocationError>;

    /// Requests a single fix, resolved on a worker thread.
    ///
    /// The first fix of a fresh watch wins, errors before it are skipped, and the request fails
    /// with [`GeolocationError::Timeout`] when nothing arrives within `options.timeout`.
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Promise<Result<Position, GeolocationError>> {
        let watch = match self.watch_position(options) {
            Ok(watch) => watch,
            Err(e) => return Promise::from_ready(Err(e)),
        };
        let timeout = options.timeout;
        Promise::spawn_thread("current_position", move || {
            let deadline = std::time::Instant::now() + timeout;
            let mut last_error = None;
            loop {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                match watch.rx.recv_timeout(remaining) {
                    Ok(GeoEvent::Fix(position)) => return Ok(position),
                    Ok(GeoEvent::Error(e)) => {
                        debug!("Skipping geolocation error while locating: {}", e);
                        last_error = Some(e);
                    }
                    Err(RecvTimeoutError::Timeout) => return Err(GeolocationError::Timeout(timeout)),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(last_error.unwrap_or_else(|| {
                            GeolocationError::PositionUnavailable("provider stopped".to_string())
                        }));
                    }
                }
            }
        })
    }
}

/// A platform without positioning.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedProvider;

impl GeolocationProvider for UnsupportedProvider {
    fn watch_position(&self, _options: &PositionOptions) -> Result<Watch, GeolocationError> {
        Err(GeolocationError::Unavailable)
    }
}

/// Builds the provider described by the configuration.
pub fn provider_from_config(source: &GeolocationSource) -> Arc<dyn GeolocationProvider> {
    match source {
        GeolocationSource::Unsupported => Arc::new(UnsupportedProvider),
        GeolocationSource::Simulated {
            lat,
            lon,
            altitude,
            accuracy,
            interval_ms,
        } => {
            let mut position = Position::new(*lat, *lon);
            position.altitude = *altitude;
            position.accuracy = Some(*accuracy);
            Arc::new(SimulatedProvider::new(
                position,
                Duration::from_millis(*interval_ms),
            ))
        }
        GeolocationSource::Nmea { path } => Arc::new(NmeaProvider::new(path.clone())),
    }
}

/// Text of the position panel.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoDisplay {
    /// One line summary.
    pub summary: String,
    /// Latitude cell.
    pub latitude: String,
    /// Longitude cell.
    pub longitude: String,
    /// Altitude cell.
    pub altitude: String,
    /// Accuracy cell.
    pub accuracy: String,
}

impl GeoDisplay {
    fn waiting() -> Self {
        Self::with_summary("Waiting for geolocation data...")
    }

    fn with_summary(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            latitude: "-".to_string(),
            longitude: "-".to_string(),
            altitude: "N/A".to_string(),
            accuracy: "N/A".to_string(),
        }
    }

    fn from_position(position: &Position) -> Self {
        let meters = |value: Option<f64>| match value {
            Some(v) => format!("{:.2} m", v),
            None => "N/A".to_string(),
        };
        Self {
            summary: format!(
                "Latitude: {:.5}° N, Longitude: {:.5}° E",
                position.latitude, position.longitude
            ),
            latitude: format!("{:.5}", position.latitude),
            longitude: format!("{:.5}", position.longitude),
            altitude: meters(position.altitude),
            accuracy: meters(position.accuracy),
        }
    }
}

/// Whether the watcher is subscribed.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchState {
    /// Receiving updates.
    Active,
    /// The platform has no positioning, nothing will ever arrive.
    Unsupported,
    /// The subscription could not be started or the provider closed it.
    Stopped(GeolocationError),
}

/// Keeps the latest position fix for the whole session.
pub struct GeolocationWatcher {
    watch: Option<Watch>,
    state: WatchState,
    latest: Option<Position>,
    last_error: Option<GeolocationError>,
    display: GeoDisplay,
}

impl GeolocationWatcher {
    /// Subscribes to `provider`.
    ///
    /// A provider without positioning is reported once and the watcher stays idle.
    pub fn start(provider: &dyn GeolocationProvider, options: &PositionOptions) -> Self {
        let (watch, state, display) = match provider.watch_position(options) {
            Ok(watch) => (Some(watch), WatchState::Active, GeoDisplay::waiting()),
            Err(GeolocationError::Unavailable) => {
                error!("Geolocation is not supported on this platform.");
                (
                    None,
                    WatchState::Unsupported,
                    GeoDisplay::with_summary("Geolocation is not supported on this platform."),
                )
            }
            Err(e) => {
                error!("Geolocation Error: {}", e);
                (None, WatchState::Stopped(e.clone()), GeoDisplay::with_summary(&e.to_string()))
            }
        };

        Self {
            watch,
            state,
            latest: None,
            last_error: None,
            display,
        }
    }

    /// Applies the events that arrived since the last call. Never blocks.
    pub fn poll(&mut self) {
        let Some(watch) = &self.watch else {
            return;
        };

        let (events, open) = watch.drain();
        for event in events {
            self.apply(event);
        }

        if !open {
            warn!("Geolocation provider stopped sending updates");
            let reason = self.last_error.clone().unwrap_or_else(|| {
                GeolocationError::PositionUnavailable("provider stopped".to_string())
            });
            self.state = WatchState::Stopped(reason);
            self.watch = None;
        }
    }

    fn apply(&mut self, event: GeoEvent) {
        match event {
            GeoEvent::Fix(position) => {
                debug!(
                    "Position update {:.6}, {:.6}",
                    position.latitude, position.longitude
                );
                self.display = GeoDisplay::from_position(&position);
                self.latest = Some(position);
                self.last_error = None;
            }
            GeoEvent::Error(e) => {
                error!("Geolocation Error: {}", e);
                self.last_error = Some(e);
            }
        }
    }

    /// The most recent fix, `None` before the first one.
    pub fn latest_position(&self) -> Option<&Position> {
        self.latest.as_ref()
    }

    /// The error of the most recent failed update, cleared by the next fix.
    pub fn last_error(&self) -> Option<&GeolocationError> {
        self.last_error.as_ref()
    }

    /// Whether the subscription is running.
    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// The text shown in the position panel.
    pub fn display(&self) -> &GeoDisplay {
        &self.display
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc::{Sender, channel};

    /// A provider whose watches are fed by the test.
    #[derive(Default)]
    pub(crate) struct ManualProvider {
        senders: Mutex<Vec<Sender<GeoEvent>>>,
    }

    impl ManualProvider {
        pub(crate) fn send(&self, event: GeoEvent) {
            self.senders
                .lock()
                .unwrap()
                .retain(|tx| tx.send(event.clone()).is_ok());
        }

        pub(crate) fn close(&self) {
            self.senders.lock().unwrap().clear();
        }
    }

    impl GeolocationProvider for ManualProvider {
        fn watch_position(&self, _options: &PositionOptions) -> Result<Watch, GeolocationError> {
            let (tx, rx) = channel();
            self.senders.lock().unwrap().push(tx);
            Ok(Watch::new(rx))
        }
    }

    #[test]
    fn latest_position_is_none_before_first_fix() {
        let provider = ManualProvider::default();
        let mut watcher = GeolocationWatcher::start(&provider, &PositionOptions::default());
        watcher.poll();

        assert!(watcher.latest_position().is_none());
        assert_eq!(watcher.state(), &WatchState::Active);
        assert_eq!(watcher.display().summary, "Waiting for geolocation data...");
    }

    #[test]
    fn fixes_overwrite_and_format() {
        let provider = ManualProvider::default();
        let mut watcher = GeolocationWatcher::start(&provider, &PositionOptions::default());

        provider.send(GeoEvent::Fix(Position::new(1.0, 2.0)));
        let mut second = Position::new(41.55, -8.42);
        second.altitude = Some(221.0);
        second.accuracy = Some(3.456);
        provider.send(GeoEvent::Fix(second.clone()));
        watcher.poll();

        assert_eq!(watcher.latest_position(), Some(&second));
        let display = watcher.display();
        assert_eq!(
            display.summary,
            "Latitude: 41.55000° N, Longitude: -8.42000° E"
        );
        assert_eq!(display.altitude, "221.00 m");
        assert_eq!(display.accuracy, "3.46 m");
    }

    #[test]
    fn errors_do_not_stop_the_watch() {
        let provider = ManualProvider::default();
        let mut watcher = GeolocationWatcher::start(&provider, &PositionOptions::default());

        provider.send(GeoEvent::Error(GeolocationError::Timeout(Duration::from_secs(20))));
        watcher.poll();
        assert!(watcher.last_error().is_some());
        assert_eq!(watcher.state(), &WatchState::Active);

        provider.send(GeoEvent::Fix(Position::new(41.55, -8.42)));
        watcher.poll();
        assert!(watcher.last_error().is_none());
        assert!(watcher.latest_position().is_some());
    }

    #[test]
    fn unsupported_platform_is_reported_once() {
        let mut watcher =
            GeolocationWatcher::start(&UnsupportedProvider, &PositionOptions::default());
        watcher.poll();
        watcher.poll();

        assert_eq!(watcher.state(), &WatchState::Unsupported);
        assert!(watcher.latest_position().is_none());
        assert_eq!(
            watcher.display().summary,
            "Geolocation is not supported on this platform."
        );
    }

    #[test]
    fn closed_provider_stops_watcher_but_keeps_last_fix() {
        let provider = ManualProvider::default();
        let mut watcher = GeolocationWatcher::start(&provider, &PositionOptions::default());
        provider.send(GeoEvent::Fix(Position::new(41.55, -8.42)));
        provider.close();
        watcher.poll();

        assert!(matches!(watcher.state(), WatchState::Stopped(_)));
        assert!(watcher.latest_position().is_some());
    }

    #[test]
    fn current_position_skips_errors_and_takes_first_fix() {
        let provider = Arc::new(ManualProvider::default());
        let options = PositionOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let promise = provider.current_position(&options);
        provider.send(GeoEvent::Error(GeolocationError::PositionUnavailable(
            "no satellites".to_string(),
        )));
        provider.send(GeoEvent::Fix(Position::new(41.55, -8.42)));

        let position = promise.block_and_take().unwrap();
        assert_eq!(position.latitude, 41.55);
    }

    #[test]
    fn current_position_times_out() {
        let provider = ManualProvider::default();
        let options = PositionOptions {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let result = provider.current_position(&options).block_and_take();
        assert_eq!(
            result,
            Err(GeolocationError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn current_position_on_unsupported_platform_is_immediate() {
        let promise = UnsupportedProvider.current_position(&PositionOptions::default());
        assert_eq!(promise.ready(), Some(&Err(GeolocationError::Unavailable)));
    }
}
