//! The building catalog: which buildings exist, where they are and which model shows them.
//!
//! The catalog is a JSON array read once at startup:
//!
//! ```json
//! [{ "id": 1, "coords": [41.55, -8.42], "modelUrl": "models/ccg.glb", "name": "Campus" }]
//! ```
//!
//! `coords` is `[latitude, longitude]`. Relative `modelUrl`s are resolved against the location
//! the catalog itself was read from.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use log::{debug, info};
use poll_promise::Promise;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::map::CLIENT;
use crate::projection::GeoPos;

/// Errors that can occur while loading the catalog.
#[derive(Error, Debug)]
pub enum CatalogLoadError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    Connection(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Failed to load model data. HTTP Status: `{0}`")]
    Status(String),

    /// A local catalog file could not be read.
    #[error("Failed to read model data")]
    Io(#[from] std::io::Error),

    /// The payload is not a valid catalog.
    #[error("Model data is not valid JSON")]
    Parse(#[from] serde_json::Error),

    /// Two records share an id.
    #[error("Duplicate location id `{0}`")]
    DuplicateId(LocationId),

    /// A record has coordinates outside the valid range.
    #[error("Location `{0}` has invalid coordinates")]
    InvalidCoords(LocationId),
}

/// The id of a catalog entry, kept as its decimal text.
///
/// The catalog may spell ids as JSON numbers or strings, both compare equal to the id taken
/// from an AR route.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LocationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LocationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

/// A building in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Unique id, used in the `#/ar/<id>` route.
    pub id: LocationId,
    /// `[latitude, longitude]` in degrees.
    pub coords: [f64; 2],
    /// Where the 3D model is, relative to the catalog or absolute.
    pub model_url: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free text shown next to the name.
    #[serde(default)]
    pub description: Option<String>,
}

impl LocationRecord {
    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.coords[0]
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.coords[1]
    }

    /// The record's position.
    pub fn geo_pos(&self) -> GeoPos {
        GeoPos::from_lat_lon(self.latitude(), self.longitude())
    }

    /// The name, or a generic one when the catalog has none.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Building {}", self.id))
    }

    fn has_valid_coords(&self) -> bool {
        let (lat, lon) = (self.latitude(), self.longitude());
        lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon)
    }
}

/// All buildings, in catalog order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    records: Vec<LocationRecord>,
    base: String,
}

impl Catalog {
    /// Parses a catalog read from `base`.
    pub fn from_json(bytes: &[u8], base: &str) -> Result<Self, CatalogLoadError> {
        let records: Vec<LocationRecord> = serde_json::from_slice(bytes)?;
        Self::new(records, base)
    }

    /// Builds a catalog, checking that ids are unique and coordinates valid.
    pub fn new(records: Vec<LocationRecord>, base: &str) -> Result<Self, CatalogLoadError> {
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(&record.id) {
                return Err(CatalogLoadError::DuplicateId(record.id.clone()));
            }
            if !record.has_valid_coords() {
                return Err(CatalogLoadError::InvalidCoords(record.id.clone()));
            }
        }

        Ok(Self {
            records,
            base: base.to_string(),
        })
    }

    /// Looks a record up by id.
    pub fn find(&self, id: &str) -> Option<&LocationRecord> {
        self.records.iter().find(|record| record.id.as_str() == id)
    }

    /// Iterates over the records.
    pub fn iter(&self) -> impl Iterator<Item = &LocationRecord> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The model location of `record`, resolved against where the catalog came from.
    pub fn model_url(&self, record: &LocationRecord) -> String {
        resolve_relative(&self.base, &record.model_url)
    }
}

/// Resolves `href` against `base`, both either URLs or file paths.
pub(crate) fn resolve_relative(base: &str, href: &str) -> String {
    if is_remote(href) || Path::new(href).is_absolute() {
        return href.to_string();
    }

    if is_remote(base) {
        return match reqwest::Url::parse(base).and_then(|base| base.join(href)) {
            Ok(url) => url.to_string(),
            Err(_) => href.to_string(),
        };
    }

    match Path::new(base).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(href).to_string_lossy().into_owned(),
        _ => href.to_string(),
    }
}

pub(crate) fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads the bytes behind a URL or file path.
///
/// `status_error` turns a non-success HTTP status into the caller's error type.
pub(crate) fn read_source<E>(source: &str, status_error: impl FnOnce(String) -> E) -> Result<Vec<u8>, E>
where
    E: From<reqwest::Error> + From<std::io::Error>,
{
    if is_remote(source) {
        debug!("Fetching {}", source);
        let response = CLIENT.get(source).send()?;
        if !response.status().is_success() {
            return Err(status_error(response.status().to_string()));
        }
        let bytes = response.bytes()?;
        debug!("Fetched {} bytes from {}", bytes.len(), source);
        Ok(bytes.to_vec())
    } else {
        debug!("Reading {}", source);
        Ok(std::fs::read(source)?)
    }
}

/// Reads and parses the catalog at `source`.
pub fn fetch_catalog(source: &str) -> Result<Catalog, CatalogLoadError> {
    let bytes = read_source(source, CatalogLoadError::Status)?;
    let catalog = Catalog::from_json(&bytes, source)?;
    info!("Loaded {} locations from {}", catalog.len(), source);
    Ok(catalog)
}

/// Fetches the catalog on a worker thread.
pub fn spawn_fetch(source: &str) -> Promise<Result<Catalog, CatalogLoadError>> {
    let source = source.to_string();
    Promise::spawn_thread("fetch_catalog", move || fetch_catalog(&source))
}
