//! The AR view: a camera looking at building models anchored to their real-world position.
//!
//! An [`ArSession`] ties together the orientation sensor, the camera feed, GPS anchoring through
//! an [`ArToolkit`] and a [`ModelLoader`]. The model is requested once, on the first GPS fix of
//! the session.

pub mod camera;
pub mod model;
pub mod renderer;
pub mod sensors;
pub mod session;
pub mod toolkit;

pub use model::{GltfLoader, Model, ModelLoadError, ModelLoader};
pub use renderer::ArRenderer;
pub use session::{ArBackends, ArPhase, ArSession};
pub use toolkit::{ArEvent, ArToolkit, LocationBased};
