//! Device orientation and camera feed.

use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;

use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

use crate::ar::camera::PerspectiveCamera;
use crate::config::CameraFeedSource;

/// Errors of the device sensors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Access to a sensor was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The device has no orientation sensor.
    #[error("device orientation unavailable: {0}")]
    OrientationUnavailable(String),

    /// There is no camera to read from.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
}

/// Device orientation angles in degrees, as reported by orientation sensors.
///
/// `alpha` is the heading around the vertical axis, `beta` the front-to-back tilt and `gamma`
/// the left-to-right tilt. A device lying flat with its top pointing north reads all zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviceOrientation {
    /// Rotation around the vertical axis.
    pub alpha: f64,
    /// Rotation around the device's x axis.
    pub beta: f64,
    /// Rotation around the device's y axis.
    pub gamma: f64,
}

impl DeviceOrientation {
    /// The camera rotation for a device in this orientation.
    ///
    /// `screen_orientation` is the rotation of the screen content in degrees (0 in portrait).
    pub fn to_quaternion(&self, screen_orientation: f64) -> UnitQuaternion<f64> {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.alpha.to_radians());
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.beta.to_radians());
        let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -self.gamma.to_radians());
        // The camera looks out of the back of the device, not out of the top.
        let back_camera = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2);
        let screen = UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(),
            -screen_orientation.to_radians(),
        );

        yaw * pitch * roll * back_camera * screen
    }
}

/// Messages of an orientation sensor.
#[derive(Clone, Debug, PartialEq)]
pub enum SensorEvent {
    /// The user allowed access, the sensor can be connected. Fires once.
    PermissionGranted,
    /// Access failed. The session carries on with a fixed camera.
    Error(SensorError),
}

/// A device orientation sensor.
pub trait OrientationSensor {
    /// Asks for access. The answer arrives as a [`SensorEvent`].
    fn init(&mut self);

    /// Starts delivering readings.
    fn connect(&mut self);

    /// Stops delivering readings.
    fn disconnect(&mut self);

    /// Events since the last call.
    fn poll_events(&mut self) -> Vec<SensorEvent>;

    /// The latest reading, `None` while disconnected.
    fn reading(&self) -> Option<DeviceOrientation>;

    /// Rotation of the screen content in degrees.
    fn screen_orientation(&self) -> f64 {
        0.0
    }

    /// Turns the view by a pointer drag, for sensors that are steered by hand.
    fn nudge(&mut self, _heading_degrees: f64, _tilt_degrees: f64) {}
}

/// An orientation "sensor" steered with the mouse or touch drags.
///
/// Starts upright looking north and grants permission right away.
#[derive(Clone, Debug)]
pub struct ManualOrientation {
    orientation: DeviceOrientation,
    connected: bool,
    pending: Vec<SensorEvent>,
}

impl Default for ManualOrientation {
    fn default() -> Self {
        Self {
            orientation: DeviceOrientation {
                alpha: 0.0,
                beta: 90.0,
                gamma: 0.0,
            },
            connected: false,
            pending: Vec::new(),
        }
    }
}

impl OrientationSensor for ManualOrientation {
    fn init(&mut self) {
        self.pending.push(SensorEvent::PermissionGranted);
    }

    fn connect(&mut self) {
        debug!("Manual orientation connected");
        self.connected = true;
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn poll_events(&mut self) -> Vec<SensorEvent> {
        std::mem::take(&mut self.pending)
    }

    fn reading(&self) -> Option<DeviceOrientation> {
        self.connected.then_some(self.orientation)
    }

    fn nudge(&mut self, heading_degrees: f64, tilt_degrees: f64) {
        self.orientation.alpha = (self.orientation.alpha + heading_degrees).rem_euclid(360.0);
        self.orientation.beta = (self.orientation.beta + tilt_degrees).clamp(0.0, 180.0);
    }
}

/// Applies orientation readings to a camera.
pub struct OrientationControls {
    sensor: Box<dyn OrientationSensor>,
    connected: bool,
}

impl OrientationControls {
    /// Wraps `sensor`.
    pub fn new(sensor: Box<dyn OrientationSensor>) -> Self {
        Self {
            sensor,
            connected: false,
        }
    }

    /// Asks the sensor for access.
    pub fn init(&mut self) {
        self.sensor.init();
    }

    /// Connects the sensor. Called when permission is granted.
    pub fn connect(&mut self) {
        self.sensor.connect();
        self.connected = true;
    }

    /// Whether readings are being applied.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Sensor events since the last call.
    pub fn poll_events(&mut self) -> Vec<SensorEvent> {
        self.sensor.poll_events()
    }

    /// Forwards a pointer drag to the sensor.
    pub fn nudge(&mut self, heading_degrees: f64, tilt_degrees: f64) {
        self.sensor.nudge(heading_degrees, tilt_degrees);
    }

    /// Turns `camera` to the latest reading.
    pub fn update(&self, camera: &mut PerspectiveCamera) {
        if !self.connected {
            return;
        }
        if let Some(orientation) = self.sensor.reading() {
            camera.rotation = orientation.to_quaternion(self.sensor.screen_orientation());
        }
    }
}

impl Drop for OrientationControls {
    fn drop(&mut self) {
        if self.connected {
            self.sensor.disconnect();
        }
    }
}

/// The background of the AR view.
pub trait CameraFeed {
    /// Opens the camera.
    fn start(&mut self) -> Result<(), SensorError>;

    /// A new frame, if one arrived since the last call.
    fn frame(&mut self) -> Option<egui::ColorImage>;

    /// Releases the camera.
    fn stop(&mut self);

    /// Whether the camera is open.
    fn is_running(&self) -> bool;
}

/// No camera at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCameraFeed;

impl CameraFeed for NoCameraFeed {
    fn start(&mut self) -> Result<(), SensorError> {
        Err(SensorError::CameraUnavailable(
            "no camera feed configured".to_string(),
        ))
    }

    fn frame(&mut self) -> Option<egui::ColorImage> {
        None
    }

    fn stop(&mut self) {}

    fn is_running(&self) -> bool {
        false
    }
}

/// A still photograph standing in for the camera stream.
#[derive(Debug)]
pub struct StillImageFeed {
    path: PathBuf,
    frame: Option<egui::ColorImage>,
    running: bool,
}

impl StillImageFeed {
    /// Uses the image at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            frame: None,
            running: false,
        }
    }
}

impl CameraFeed for StillImageFeed {
    fn start(&mut self) -> Result<(), SensorError> {
        let image = image::open(&self.path)
            .map_err(|e| {
                SensorError::CameraUnavailable(format!("{}: {}", self.path.display(), e))
            })?
            .to_rgba8();
        let size = [image.width() as _, image.height() as _];
        self.frame = Some(egui::ColorImage::from_rgba_unmultiplied(
            size,
            &image.into_raw(),
        ));
        self.running = true;
        info!("Camera feed started from {}", self.path.display());
        Ok(())
    }

    fn frame(&mut self) -> Option<egui::ColorImage> {
        if self.running { self.frame.take() } else { None }
    }

    fn stop(&mut self) {
        if self.running {
            info!("Camera feed stopped");
        }
        self.running = false;
        self.frame = None;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Builds the camera feed described by the configuration.
pub fn camera_feed_from_config(source: &CameraFeedSource) -> Box<dyn CameraFeed> {
    match source {
        CameraFeedSource::None => Box::new(NoCameraFeed),
        CameraFeedSource::Image { path } => Box::new(StillImageFeed::new(path.clone())),
    }
}
