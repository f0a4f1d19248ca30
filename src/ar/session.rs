//! One activation of the AR view.

use std::sync::Arc;

use log::{debug, info, warn};
use nalgebra::Point3;
use poll_promise::Promise;

use crate::ar::camera::{AmbientLight, DirectionalLight, PerspectiveCamera};
use crate::ar::model::{GltfLoader, Model, ModelLoadError, ModelLoader};
use crate::ar::sensors::{
    CameraFeed, ManualOrientation, OrientationControls, OrientationSensor, SensorEvent,
    camera_feed_from_config,
};
use crate::ar::toolkit::{ArEvent, ArToolkit, LocationBased};
use crate::catalog::LocationRecord;
use crate::config::ArConfig;
use crate::geolocation::{GeolocationProvider, PositionOptions};
use crate::notice::{NoticeLevel, Notices};

/// Degrees the view turns per point of pointer drag.
const DRAG_DEGREES_PER_POINT: f64 = 0.2;

/// Where the session is in placing its model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArPhase {
    /// No GPS fix yet, nothing is loading.
    AwaitingFirstFix,
    /// The first fix arrived and the model was requested. Never left for the session's lifetime.
    ModelPlaced,
}

/// The collaborators a session drives.
pub struct ArBackends {
    /// GPS anchoring.
    pub toolkit: Box<dyn ArToolkit>,
    /// Model loader.
    pub loader: Arc<dyn ModelLoader>,
    /// Device orientation.
    pub sensor: Box<dyn OrientationSensor>,
    /// Background.
    pub feed: Box<dyn CameraFeed>,
}

impl ArBackends {
    /// The GPS toolkit, glTF loader, hand steered orientation and configured camera feed.
    pub fn from_config(
        config: &ArConfig,
        provider: Arc<dyn GeolocationProvider>,
        options: PositionOptions,
    ) -> Self {
        Self {
            toolkit: Box::new(LocationBased::new(
                provider,
                options,
                config.gps_min_distance,
                config.gps_min_accuracy,
            )),
            loader: Arc::new(GltfLoader),
            sensor: Box::new(ManualOrientation::default()),
            feed: camera_feed_from_config(&config.camera_feed),
        }
    }
}

/// The AR scene for a single building.
///
/// Dropping the session stops the camera feed and the GPS subscription. A model load still in
/// flight is discarded with it.
pub struct ArSession {
    record: LocationRecord,
    model_url: String,
    phase: ArPhase,
    pending: Option<Promise<Result<Model, ModelLoadError>>>,
    camera: PerspectiveCamera,
    ambient: AmbientLight,
    sun: DirectionalLight,
    toolkit: Box<dyn ArToolkit>,
    loader: Arc<dyn ModelLoader>,
    controls: OrientationControls,
    feed: Box<dyn CameraFeed>,
    config: ArConfig,
}

impl ArSession {
    /// Builds the scene for `record`, whose model is at `model_url`.
    pub fn new(
        record: LocationRecord,
        model_url: String,
        config: &ArConfig,
        backends: ArBackends,
    ) -> Self {
        let [x, y, z] = config.sun_position;
        Self {
            record,
            model_url,
            phase: ArPhase::AwaitingFirstFix,
            pending: None,
            camera: PerspectiveCamera::new(config.fov, 1.0, config.near, config.far),
            ambient: AmbientLight {
                intensity: config.ambient_intensity,
            },
            sun: DirectionalLight {
                position: Point3::new(x, y, z),
                target: Point3::origin(),
                intensity: config.sun_intensity,
            },
            toolkit: backends.toolkit,
            loader: backends.loader,
            controls: OrientationControls::new(backends.sensor),
            feed: backends.feed,
            config: config.clone(),
        }
    }

    /// Starts the camera feed, the orientation sensor and GPS.
    pub fn start(&mut self, notices: &mut Notices) {
        info!("Starting AR session for {}", self.record.display_name());

        if let Err(e) = self.feed.start() {
            notices.error(format!("Webcam error: {}", e));
        }

        self.controls.init();

        if let Err(e) = self.toolkit.start_gps() {
            notices.push(NoticeLevel::Warning, format!("GPS error: {}", e));
        }
    }

    /// Handles sensor, GPS and loader events. Call once per frame.
    pub fn poll(&mut self, notices: &mut Notices) {
        for event in self.controls.poll_events() {
            match event {
                SensorEvent::PermissionGranted => self.controls.connect(),
                SensorEvent::Error(e) => notices.error(format!("Device orientation error: {}", e)),
            }
        }

        for event in self.toolkit.poll(&mut self.camera) {
            match event {
                ArEvent::GpsUpdate { position, .. } if self.phase == ArPhase::AwaitingFirstFix => {
                    self.phase = ArPhase::ModelPlaced;
                    notices.info("GPS location acquired. You can now see the AR content.");
                    debug!(
                        "First fix at {:.6}, {:.6}, loading {}",
                        position.latitude, position.longitude, self.model_url
                    );
                    self.pending = Some(self.loader.load(&self.model_url));
                }
                ArEvent::GpsUpdate { .. } => {}
                ArEvent::GpsError(e) => warn!("GPS error: {}", e),
            }
        }

        let Some(promise) = self.pending.take() else {
            return;
        };
        match promise.try_take() {
            Ok(Ok(mut model)) => {
                model.position.y = self.config.model_height_offset;
                model.rotation_y = self.config.model_rotation_y;
                info!("Placing model {}", model.source);
                self.toolkit
                    .add(model, self.record.longitude(), self.record.latitude());
            }
            Ok(Err(e)) => notices.error(format!("Failed to load GLB model: {}", e)),
            Err(promise) => self.pending = Some(promise),
        }
    }

    /// Turns the camera to the latest orientation and keeps the sun behind it.
    pub fn frame(&mut self) {
        self.controls.update(&mut self.camera);
        self.sun.follow_camera(
            &self.camera,
            self.config.sun_distance_behind,
            self.config.sun_height_above,
        );
    }

    /// Matches the camera to a new output size.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.camera.set_viewport(width, height);
    }

    /// Turns the view by a pointer drag in points.
    pub fn pointer_drag(&mut self, dx: f32, dy: f32) {
        self.controls.nudge(
            dx as f64 * DRAG_DEGREES_PER_POINT,
            dy as f64 * DRAG_DEGREES_PER_POINT,
        );
    }

    /// The building shown.
    pub fn record(&self) -> &LocationRecord {
        &self.record
    }

    /// Where the session is in placing its model.
    pub fn phase(&self) -> ArPhase {
        self.phase
    }

    /// Whether the model is still loading.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// The camera.
    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    /// The ambient light.
    pub fn ambient(&self) -> &AmbientLight {
        &self.ambient
    }

    /// The directional light.
    pub fn sun(&self) -> &DirectionalLight {
        &self.sun
    }

    /// The anchored models.
    pub fn objects(&self) -> &[Model] {
        self.toolkit.objects()
    }

    /// A new background frame, if one arrived.
    pub fn camera_frame(&mut self) -> Option<egui::ColorImage> {
        self.feed.frame()
    }
}

impl Drop for ArSession {
    fn drop(&mut self) {
        self.toolkit.stop_gps();
        self.feed.stop();
        if self.pending.is_some() {
            debug!("Discarding model load of {}", self.model_url);
        }
        info!("AR session for {} ended", self.record.display_name());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Mutex;

    use crate::ar::model::parse_gltf;
    use crate::ar::model::tests::BOX_GLTF;
    use crate::ar::sensors::{DeviceOrientation, NoCameraFeed, SensorError};
    use crate::catalog::Catalog;
    use crate::geolocation::{GeolocationError, Position};

    /// Everything the fakes saw, shared with the test.
    #[derive(Default)]
    pub(crate) struct Recorded {
        pub(crate) events: Vec<ArEvent>,
        pub(crate) added: Vec<(Model, f64, f64)>,
        pub(crate) gps_running: bool,
        pub(crate) gps_refused: bool,
    }

    /// A toolkit replaying the events the test queued.
    pub(crate) struct FakeToolkit(pub(crate) Rc<RefCell<Recorded>>);

    impl ArToolkit for FakeToolkit {
        fn start_gps(&mut self) -> Result<(), GeolocationError> {
            let mut recorded = self.0.borrow_mut();
            if recorded.gps_refused {
                return Err(GeolocationError::PermissionDenied("refused".to_string()));
            }
            recorded.gps_running = true;
            Ok(())
        }

        fn stop_gps(&mut self) {
            self.0.borrow_mut().gps_running = false;
        }

        fn poll(&mut self, _camera: &mut PerspectiveCamera) -> Vec<ArEvent> {
            std::mem::take(&mut self.0.borrow_mut().events)
        }

        fn add(&mut self, model: Model, lon: f64, lat: f64) {
            self.0.borrow_mut().added.push((model, lon, lat));
        }

        fn objects(&self) -> &[Model] {
            &[]
        }
    }

    type LoadSender = poll_promise::Sender<Result<Model, ModelLoadError>>;

    /// A loader answering immediately, or never when `hold` is set.
    #[derive(Default)]
    pub(crate) struct FakeLoader {
        pub(crate) requests: Mutex<Vec<String>>,
        pub(crate) fail: bool,
        pub(crate) hold: bool,
        held: Mutex<Vec<LoadSender>>,
    }

    impl ModelLoader for FakeLoader {
        fn load(&self, url: &str) -> Promise<Result<Model, ModelLoadError>> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.hold {
                let (sender, promise) = Promise::new();
                self.held.lock().unwrap().push(sender);
                return promise;
            }
            if self.fail {
                return Promise::from_ready(Err(ModelLoadError::NotGltf));
            }
            Promise::from_ready(parse_gltf(BOX_GLTF.as_bytes(), url))
        }
    }

    fn record() -> LocationRecord {
        Catalog::from_json(
            br#"[{"id": 1, "coords": [41.55, -8.42], "modelUrl": "a.glb"}]"#,
            "models.json",
        )
        .unwrap()
        .find("1")
        .unwrap()
        .clone()
    }

    /// A sensor whose permission request fails.
    struct RefusedSensor {
        events: Vec<SensorEvent>,
    }

    impl OrientationSensor for RefusedSensor {
        fn init(&mut self) {
            self.events.push(SensorEvent::Error(SensorError::PermissionDenied(
                "orientation access refused".to_string(),
            )));
        }

        fn connect(&mut self) {}

        fn disconnect(&mut self) {}

        fn poll_events(&mut self) -> Vec<SensorEvent> {
            std::mem::take(&mut self.events)
        }

        fn reading(&self) -> Option<DeviceOrientation> {
            None
        }
    }

    fn session(loader: Arc<FakeLoader>) -> (ArSession, Rc<RefCell<Recorded>>) {
        session_with(loader, Box::new(ManualOrientation::default()), false)
    }

    fn session_with(
        loader: Arc<FakeLoader>,
        sensor: Box<dyn OrientationSensor>,
        gps_refused: bool,
    ) -> (ArSession, Rc<RefCell<Recorded>>) {
        let recorded = Rc::new(RefCell::new(Recorded {
            gps_refused,
            ..Default::default()
        }));
        let backends = ArBackends {
            toolkit: Box::new(FakeToolkit(recorded.clone())),
            loader,
            sensor,
            feed: Box::new(NoCameraFeed),
        };
        let session = ArSession::new(record(), "a.glb".to_string(), &ArConfig::default(), backends);
        (session, recorded)
    }

    fn gps_update() -> ArEvent {
        ArEvent::GpsUpdate {
            position: Position::new(41.55, -8.42),
            distance_moved: 0.0,
        }
    }

    #[test]
    fn first_fix_loads_and_anchors_model_once() {
        let loader = Arc::new(FakeLoader::default());
        let (mut session, recorded) = session(loader.clone());
        let mut notices = Notices::default();
        session.start(&mut notices);
        session.poll(&mut notices);
        assert_eq!(session.phase(), ArPhase::AwaitingFirstFix);
        assert!(loader.requests.lock().unwrap().is_empty());

        recorded.borrow_mut().events = vec![gps_update(), gps_update()];
        session.poll(&mut notices);
        recorded.borrow_mut().events = vec![gps_update()];
        session.poll(&mut notices);

        assert_eq!(session.phase(), ArPhase::ModelPlaced);
        assert_eq!(*loader.requests.lock().unwrap(), ["a.glb"]);

        let recorded = recorded.borrow();
        assert_eq!(recorded.added.len(), 1);
        let (model, lon, lat) = &recorded.added[0];
        assert_eq!((*lon, *lat), (-8.42, 41.55));
        assert_eq!(model.position.y, -2.8);
        assert_eq!(model.rotation_y, -std::f64::consts::FRAC_PI_3);

        assert!(
            notices
                .active()
                .any(|n| n.text == "GPS location acquired. You can now see the AR content.")
        );
    }

    #[test]
    fn failed_load_is_a_notice() {
        let loader = Arc::new(FakeLoader {
            fail: true,
            ..Default::default()
        });
        let (mut session, recorded) = session(loader);
        let mut notices = Notices::default();
        session.start(&mut notices);

        recorded.borrow_mut().events = vec![gps_update()];
        session.poll(&mut notices);

        assert!(recorded.borrow().added.is_empty());
        assert_eq!(session.phase(), ArPhase::ModelPlaced);
        assert!(notices.active().any(|n| n.level == NoticeLevel::Error
            && n.text.starts_with("Failed to load GLB model: ")));
    }

    #[test]
    fn missing_camera_is_a_notice() {
        let (mut session, _) = session(Arc::new(FakeLoader::default()));
        let mut notices = Notices::default();
        session.start(&mut notices);

        assert!(notices.active().any(|n| n.text.starts_with("Webcam error: ")));
    }

    #[test]
    fn resize_keeps_phase_and_does_not_reload() {
        let loader = Arc::new(FakeLoader::default());
        let (mut session, recorded) = session(loader.clone());
        let mut notices = Notices::default();
        session.start(&mut notices);
        recorded.borrow_mut().events = vec![gps_update()];
        session.poll(&mut notices);

        session.resize(800.0, 400.0);
        session.poll(&mut notices);

        assert_eq!(session.phase(), ArPhase::ModelPlaced);
        assert_eq!(session.camera().aspect, 2.0);
        assert_eq!(session.camera().fov, 80.0);
        assert_eq!(loader.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_session_stops_gps_and_discards_load() {
        let loader = Arc::new(FakeLoader {
            hold: true,
            ..Default::default()
        });
        let (mut session, recorded) = session(loader);
        let mut notices = Notices::default();
        session.start(&mut notices);
        assert!(recorded.borrow().gps_running);

        recorded.borrow_mut().events = vec![gps_update()];
        session.poll(&mut notices);
        assert!(session.is_loading());

        drop(session);
        let recorded = recorded.borrow();
        assert!(!recorded.gps_running);
        assert!(recorded.added.is_empty());
    }

    #[test]
    fn orientation_is_connected_after_permission() {
        let (mut session, _) = session(Arc::new(FakeLoader::default()));
        let mut notices = Notices::default();
        session.start(&mut notices);
        session.poll(&mut notices);

        session.pointer_drag(450.0, 0.0);
        session.frame();

        // 450 points at 0.2 degrees each is a quarter turn to the left, towards -X.
        let direction = session.camera().world_direction();
        assert!((direction.x + 1.0).abs() < 1e-9);
        // The sun sits behind the camera, so on the +X side.
        assert!((session.sun().position.x - 10.0).abs() < 1e-9);
        assert!((session.sun().position.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn orientation_error_is_a_notice_and_session_keeps_running() {
        let loader = Arc::new(FakeLoader::default());
        let sensor = Box::new(RefusedSensor { events: Vec::new() });
        let (mut session, recorded) = session_with(loader.clone(), sensor, false);
        let mut notices = Notices::default();
        session.start(&mut notices);
        session.poll(&mut notices);

        assert!(notices.active().any(|n| n.level == NoticeLevel::Error
            && n.text
                == "Device orientation error: permission denied: orientation access refused"));

        // Without readings the camera keeps looking north.
        session.frame();
        assert!((session.camera().world_direction().z + 1.0).abs() < 1e-9);

        recorded.borrow_mut().events = vec![gps_update()];
        session.poll(&mut notices);
        assert_eq!(session.phase(), ArPhase::ModelPlaced);
        assert_eq!(recorded.borrow().added.len(), 1);
    }

    #[test]
    fn refused_gps_is_a_warning() {
        let loader = Arc::new(FakeLoader::default());
        let (mut session, recorded) =
            session_with(loader.clone(), Box::new(ManualOrientation::default()), true);
        let mut notices = Notices::default();
        session.start(&mut notices);
        session.poll(&mut notices);

        assert!(!recorded.borrow().gps_running);
        assert!(notices.active().any(|n| n.level == NoticeLevel::Warning
            && n.text.starts_with("GPS error: Permission to access the position was denied")));
        assert_eq!(session.phase(), ArPhase::AwaitingFirstFix);
        assert!(loader.requests.lock().unwrap().is_empty());
    }
}
