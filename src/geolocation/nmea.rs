use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::SystemTime;

use log::{debug, info, warn};

use super::{GeoEvent, GeolocationError, GeolocationProvider, Position, PositionOptions, Watch};

/// User equivalent range error of a consumer receiver, multiplied with HDOP to estimate accuracy.
const UERE_METERS: f64 = 5.0;

/// Reads `GGA` sentences from a serial device node or a recorded log.
#[derive(Clone, Debug)]
pub struct NmeaProvider {
    path: PathBuf,
}

impl NmeaProvider {
    /// Creates a provider reading from `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl GeolocationProvider for NmeaProvider {
    fn watch_position(&self, options: &PositionOptions) -> Result<Watch, GeolocationError> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                GeolocationError::PermissionDenied(format!("{}: {}", self.path.display(), e))
            }
            _ => GeolocationError::PositionUnavailable(format!("{}: {}", self.path.display(), e)),
        })?;
        info!("Reading NMEA sentences from {}", self.path.display());

        let (line_tx, line_rx) = channel();
        let (tx, rx) = channel();
        let timeout = options.timeout;
        let spawn_error = |e: std::io::Error| GeolocationError::PositionUnavailable(e.to_string());

        std::thread::Builder::new()
            .name("nmea_reader".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(file);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => return,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Failed to read NMEA stream: {}", e);
                            return;
                        }
                    }
                    // Noise from a wrong baud rate is not UTF-8 and fails to parse.
                    let line = String::from_utf8_lossy(&buf);
                    match parse_gga(&line) {
                        Ok(Some(Sentence::Fix(position))) => {
                            if line_tx.send(position).is_err() {
                                return;
                            }
                        }
                        Ok(Some(Sentence::NoFix)) | Ok(None) => {}
                        Err(reason) => debug!("Ignoring NMEA line {:?}: {}", line, reason),
                    }
                }
            })
            .map_err(spawn_error)?;

        std::thread::Builder::new()
            .name("nmea_watch".to_string())
            .spawn(move || {
                loop {
                    let event = match line_rx.recv_timeout(timeout) {
                        Ok(position) => GeoEvent::Fix(position),
                        Err(RecvTimeoutError::Timeout) => {
                            GeoEvent::Error(GeolocationError::Timeout(timeout))
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            let _ = tx.send(GeoEvent::Error(GeolocationError::PositionUnavailable(
                                "end of NMEA stream".to_string(),
                            )));
                            return;
                        }
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            })
            .map_err(spawn_error)?;

        Ok(Watch::new(rx))
    }
}

#[derive(Debug, PartialEq)]
enum Sentence {
    Fix(Position),
    /// A `GGA` sentence reporting fix quality 0.
    NoFix,
}

/// Parses one `GGA` sentence. Other sentence types yield `Ok(None)`.
fn parse_gga(line: &str) -> Result<Option<Sentence>, String> {
    let line = line.trim();
    let Some(body) = line.strip_prefix('$') else {
        return Err("missing '$'".to_string());
    };

    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum, 16).map_err(|e| e.to_string())?;
            let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if expected != actual {
                return Err(format!("checksum {:02X} != {:02X}", actual, expected));
            }
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    if fields.first().is_none_or(|talker| !talker.ends_with("GGA")) {
        return Ok(None);
    }
    if fields.len() < 10 {
        return Err("truncated GGA sentence".to_string());
    }

    if fields[6].trim().is_empty() || fields[6] == "0" {
        return Ok(Some(Sentence::NoFix));
    }

    let latitude = parse_coordinate(fields[2], fields[3], 2)?;
    let longitude = parse_coordinate(fields[4], fields[5], 3)?;
    let accuracy = fields[8].parse::<f64>().ok().map(|hdop| hdop * UERE_METERS);
    let altitude = fields[9].parse::<f64>().ok();

    Ok(Some(Sentence::Fix(Position {
        latitude,
        longitude,
        altitude,
        accuracy,
        timestamp: SystemTime::now(),
    })))
}

/// Converts `ddmm.mmmm` / `dddmm.mmmm` and a hemisphere letter to signed degrees.
fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Result<f64, String> {
    let (Some(degrees), Some(minutes)) = (value.get(..degree_digits), value.get(degree_digits..))
    else {
        return Err(format!("invalid coordinate {:?}", value));
    };
    if minutes.is_empty() {
        return Err(format!("invalid coordinate {:?}", value));
    }
    let degrees: f64 = degrees
        .parse()
        .map_err(|_| format!("invalid degrees {:?}", value))?;
    let minutes: f64 = minutes
        .parse()
        .map_err(|_| format!("invalid minutes {:?}", value))?;
    let magnitude = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Ok(magnitude),
        "S" | "W" => Ok(-magnitude),
        _ => Err(format!("invalid hemisphere {:?}", hemisphere)),
    }
}
