//! 3D models and their loader.
//!
//! The AR view only needs to know where a model is and how much space it takes, so loading a
//! glTF asset reads the bounds of its mesh geometry. Both the binary container (`.glb`) and the
//! JSON form (`.gltf`) are accepted.

use std::collections::HashMap;

use log::{debug, error, info};
use nalgebra::{Point3, Vector3};
use poll_promise::Promise;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::read_source;

/// `glTF` in little endian.
const GLB_MAGIC: u32 = 0x4654_6C67;
/// `JSON` in little endian.
const CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Errors that can occur while loading a model.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    /// An error occurred while making a web request.
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP Status: `{0}`")]
    Status(String),

    /// A local model file could not be read.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The bytes are neither a binary nor a JSON glTF asset.
    #[error("not a glTF asset")]
    NotGltf,

    /// The asset uses a glTF version other than 2.
    #[error("unsupported glTF version {0}")]
    UnsupportedVersion(String),

    /// The binary container ends before its declared length.
    #[error("truncated glTF binary")]
    Truncated,

    /// The JSON part of the asset is malformed.
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The asset has no mesh positions to place.
    #[error("the asset has no geometry")]
    NoGeometry,
}

/// An axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Smallest corner.
    pub min: Point3<f64>,
    /// Largest corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// The smallest box containing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Edge lengths.
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// The eight corners, bottom face first.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(b.x, b.y, b.z),
            Point3::new(a.x, b.y, b.z),
        ]
    }
}

/// A loaded model, placed in the scene by the AR toolkit.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    /// Where the model was loaded from.
    pub source: String,
    /// Bounds of the geometry in model space.
    pub bounds: Aabb,
    /// Number of meshes in the asset.
    pub mesh_count: usize,
    /// Position in world space.
    pub position: Point3<f64>,
    /// Rotation around the vertical axis, in radians.
    pub rotation_y: f64,
}

impl Model {
    /// The model's bounding box corners in world space.
    pub fn world_corners(&self) -> [Point3<f64>; 8] {
        let rotation = nalgebra::Rotation3::from_axis_angle(&Vector3::y_axis(), self.rotation_y);
        self.bounds
            .corners()
            .map(|corner| self.position + rotation * corner.coords)
    }
}

/// Loads models off the UI thread.
pub trait ModelLoader: Send + Sync {
    /// Starts loading the model at `url`.
    fn load(&self, url: &str) -> Promise<Result<Model, ModelLoadError>>;
}

/// Loads glTF 2.0 assets over HTTP(S) or from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct GltfLoader;

impl ModelLoader for GltfLoader {
    fn load(&self, url: &str) -> Promise<Result<Model, ModelLoadError>> {
        let url = url.to_string();
        Promise::spawn_thread("load_model", move || {
            info!("Loading model from {}", url);
            let result = read_source(&url, ModelLoadError::Status)
                .and_then(|bytes| parse_gltf(&bytes, &url));
            match &result {
                Ok(model) => debug!(
                    "Loaded {} ({} meshes, size {:?})",
                    url,
                    model.mesh_count,
                    model.bounds.size()
                ),
                Err(e) => error!("Failed to load model from {}: {}", url, e),
            }
            result
        })
    }
}

#[derive(Deserialize)]
struct GltfDocument {
    asset: GltfAsset,
    #[serde(default)]
    meshes: Vec<GltfMesh>,
    #[serde(default)]
    accessors: Vec<GltfAccessor>,
}

#[derive(Deserialize)]
struct GltfAsset {
    version: String,
}

#[derive(Deserialize)]
struct GltfMesh {
    primitives: Vec<GltfPrimitive>,
}

#[derive(Deserialize)]
struct GltfPrimitive {
    attributes: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct GltfAccessor {
    #[serde(default)]
    min: Option<Vec<f64>>,
    #[serde(default)]
    max: Option<Vec<f64>>,
}

/// Parses a `.glb` or `.gltf` asset.
///
/// Bounds come from the `min`/`max` of the `POSITION` accessors, which glTF requires. Node
/// transforms are not applied.
pub fn parse_gltf(bytes: &[u8], source: &str) -> Result<Model, ModelLoadError> {
    let json = if bytes.starts_with(&GLB_MAGIC.to_le_bytes()) {
        glb_json_chunk(bytes)?
    } else if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        bytes
    } else {
        return Err(ModelLoadError::NotGltf);
    };

    let document: GltfDocument = serde_json::from_slice(json)?;
    if !document.asset.version.starts_with('2') {
        return Err(ModelLoadError::UnsupportedVersion(document.asset.version));
    }

    let bounds = document
        .meshes
        .iter()
        .flat_map(|mesh| &mesh.primitives)
        .filter_map(|primitive| primitive.attributes.get("POSITION"))
        .filter_map(|&index| document.accessors.get(index))
        .filter_map(accessor_bounds)
        .reduce(|a, b| a.union(&b))
        .ok_or(ModelLoadError::NoGeometry)?;

    Ok(Model {
        source: source.to_string(),
        bounds,
        mesh_count: document.meshes.len(),
        position: Point3::origin(),
        rotation_y: 0.0,
    })
}

fn accessor_bounds(accessor: &GltfAccessor) -> Option<Aabb> {
    match (accessor.min.as_deref()?, accessor.max.as_deref()?) {
        ([x0, y0, z0, ..], [x1, y1, z1, ..]) => Some(Aabb {
            min: Point3::new(*x0, *y0, *z0),
            max: Point3::new(*x1, *y1, *z1),
        }),
        _ => None,
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ModelLoadError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ModelLoadError::Truncated)
}

/// Validates the binary container and returns its JSON chunk.
fn glb_json_chunk(bytes: &[u8]) -> Result<&[u8], ModelLoadError> {
    let version = read_u32(bytes, 4)?;
    if version != 2 {
        return Err(ModelLoadError::UnsupportedVersion(version.to_string()));
    }

    let length = read_u32(bytes, 8)? as usize;
    if length > bytes.len() || length < GLB_HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(ModelLoadError::Truncated);
    }
    let bytes = &bytes[..length];

    let chunk_length = read_u32(bytes, GLB_HEADER_LEN)? as usize;
    let chunk_type = read_u32(bytes, GLB_HEADER_LEN + 4)?;
    if chunk_type != CHUNK_JSON {
        return Err(ModelLoadError::NotGltf);
    }

    let start = GLB_HEADER_LEN + CHUNK_HEADER_LEN;
    bytes
        .get(start..start + chunk_length)
        .ok_or(ModelLoadError::Truncated)
}
