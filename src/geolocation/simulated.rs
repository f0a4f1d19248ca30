use std::sync::mpsc::channel;
use std::time::{Duration, SystemTime};

use log::debug;

use super::{GeoEvent, GeolocationError, GeolocationProvider, Position, PositionOptions, Watch};

/// Shortest delay between two simulated fixes.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Reports a fixed position, once per interval, to every watch.
///
/// Useful on machines without a receiver and for demonstrations.
#[derive(Clone, Debug)]
pub struct SimulatedProvider {
    position: Position,
    interval: Duration,
}

impl SimulatedProvider {
    /// Creates a provider reporting `position` every `interval`, at most every 10 ms.
    pub fn new(position: Position, interval: Duration) -> Self {
        Self {
            position,
            interval: interval.max(MIN_INTERVAL),
        }
    }
}

impl GeolocationProvider for SimulatedProvider {
    fn watch_position(&self, _options: &PositionOptions) -> Result<Watch, GeolocationError> {
        let (tx, rx) = channel();
        let position = self.position.clone();
        let interval = self.interval;

        std::thread::Builder::new()
            .name("simulated_gps".to_string())
            .spawn(move || {
                loop {
                    let fix = Position {
                        timestamp: SystemTime::now(),
                        ..position.clone()
                    };
                    if tx.send(GeoEvent::Fix(fix)).is_err() {
                        debug!("Simulated position watch dropped");
                        return;
                    }
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| GeolocationError::PositionUnavailable(e.to_string()))?;

        Ok(Watch::new(rx))
    }
}
