//! Single-slot persistence of the last successful lookup.
//!
//! The record keeps the shape `{ "lastQuery": ..., "lastCoords": ... }`.
//! Read failures of any kind mean "nothing saved"; write failures are logged.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
};

use crate::model::{Coordinates, LocationQuery};

pub trait LocationStore: Send + Sync + Debug {
    fn load(&self) -> Option<LocationQuery>;

    /// `None` deletes the record.
    fn save(&self, location: Option<&LocationQuery>);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastSearch {
    last_query: Option<String>,
    last_coords: Option<Coordinates>,
}

impl LastSearch {
    fn into_location(self) -> Option<LocationQuery> {
        match (self.last_query, self.last_coords) {
            (Some(name), _) if !name.is_empty() => Some(LocationQuery::Name { value: name }),
            (_, Some(c)) => Some(LocationQuery::coords(c.lat, c.lon)),
            _ => None,
        }
    }
}

impl From<&LocationQuery> for LastSearch {
    fn from(location: &LocationQuery) -> Self {
        match location {
            LocationQuery::Name { value } => Self {
                last_query: Some(value.clone()),
                last_coords: None,
            },
            LocationQuery::Coords { lat, lon } => Self {
                last_query: None,
                last_coords: Some(Coordinates::new(*lat, *lon)),
            },
        }
    }
}

fn decode(raw: &str) -> Option<LocationQuery> {
    match serde_json::from_str::<LastSearch>(raw) {
        Ok(record) => record.into_location(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed last search record");
            None
        }
    }
}

fn encode(location: &LocationQuery) -> Option<String> {
    serde_json::to_string(&LastSearch::from(location))
        .map_err(|e| tracing::warn!(error = %e, "Failed to serialize last search"))
        .ok()
}

/// Stores the record as a JSON file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)
    }
}

impl LocationStore for FileStore {
    fn load(&self) -> Option<LocationQuery> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read last search");
                return None;
            }
        };
        decode(&raw)
    }

    fn save(&self, location: Option<&LocationQuery>) {
        let result = match location.and_then(encode) {
            Some(json) => self.write(&json),
            None if location.is_some() => return,
            None => match fs::remove_file(&self.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };

        match result {
            Ok(()) => tracing::debug!(path = %self.path.display(), ?location, "Updated last search"),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist last search")
            }
        }
    }
}

/// In-process store; holds the serialized record like the file store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with raw record text.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl LocationStore for MemoryStore {
    fn load(&self) -> Option<LocationQuery> {
        self.slot.lock().as_deref().and_then(decode)
    }

    fn save(&self, location: Option<&LocationQuery>) {
        let mut slot = self.slot.lock();
        match location {
            Some(location) => {
                if let Some(json) = encode(location) {
                    *slot = Some(json);
                }
            }
            None => *slot = None,
        }
    }
}
