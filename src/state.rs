//! Single slot persistence of the last observation.
//!
//! The file is the baseline for the next report's deltas. It is replaced
//! atomically (temp file, fsync, rename) so a crash mid-write leaves the
//! previous baseline readable.
use crate::aggregate::{CountryAggregation, CountryCode};
use crate::error::Error;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub last: Observation,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub ts: i64,
    pub total: u64,
    #[serde(alias = "by_cc")]
    pub by_country: BTreeMap<CountryCode, u64>,
}

impl PersistedState {
    pub fn new(ts: i64, aggregation: CountryAggregation) -> Self {
        PersistedState {
            last: Observation {
                ts,
                total: aggregation.total,
                by_country: aggregation.by_country,
            },
        }
    }

    pub fn aggregation(&self) -> CountryAggregation {
        CountryAggregation {
            total: self.last.total,
            by_country: self.last.by_country.clone(),
        }
    }
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the committed baseline, or `None` when there is nothing usable.
    /// A corrupt file is logged and treated exactly like a first run.
    pub fn load(&self) -> Option<PersistedState> {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    kind = e.kind(),
                    "ignoring persisted state: {}",
                    e
                );
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<PersistedState>, Error> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::StateCorrupt(e.to_string())),
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| Error::StateCorrupt(e.to_string()))
    }

    /// Writes to a fresh temp file next to the target and renames it into
    /// place. Every save gets its own temp file, so overlapping saves never
    /// share a half-written file; the last rename wins.
    pub fn save(&self, state: &PersistedState) -> Result<(), Error> {
        let data = serde_json::to_vec_pretty(state).map_err(std::io::Error::from)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".state-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
