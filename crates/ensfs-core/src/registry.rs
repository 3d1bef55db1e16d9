//! Case registry: the set of known case names under an ensemble root.
//!
//! A case is a subdirectory of the storage path carrying a
//! `case_info.json` marker. The marker is what distinguishes a case
//! directory from an unrelated directory that happens to live under the
//! storage path; only marked directories are ever listed or mounted.
//!
//! The registry is read-mostly: it scans once on open and again on
//! [`refresh`](CaseRegistry::refresh), independent of which cases are
//! currently mounted.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the marker file identifying a case directory.
pub const CASE_MARKER: &str = "case_info.json";

/// On-disk format version written into new markers.
const CASE_FORMAT_VERSION: u32 = 1;

/// Errors raised by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The storage path cannot be read.
    #[error("ensemble storage at {path} is unavailable: {source}")]
    Unavailable {
        /// The storage path.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The case name cannot be used as a directory name.
    #[error("invalid case name: {0:?}")]
    InvalidCaseName(String),

    /// Creating the case directory or marker failed.
    #[error("failed to register case {name}: {source}")]
    Register {
        /// The case name.
        name: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Contents of the `case_info.json` marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaseInfo {
    name: String,
    format_version: u32,
}

/// Tracks the set of case names discoverable under one storage path.
#[derive(Debug)]
pub struct CaseRegistry {
    storage_path: PathBuf,
    known: RwLock<BTreeSet<String>>,
}

impl CaseRegistry {
    /// Open a registry over `storage_path` and scan it.
    pub fn open(storage_path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self {
            storage_path: storage_path.into(),
            known: RwLock::new(BTreeSet::new()),
        };
        registry.refresh()?;
        Ok(registry)
    }

    /// The storage path this registry scans.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// The on-disk directory for a case, whether or not it exists yet.
    pub fn case_root(&self, name: &str) -> PathBuf {
        self.storage_path.join(name)
    }

    /// Whether a case name is known.
    pub fn exists(&self, name: &str) -> bool {
        self.known.read().contains(name)
    }

    /// All known case names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.known.read().iter().cloned().collect()
    }

    /// Rescan the storage path.
    pub fn refresh(&self) -> Result<(), RegistryError> {
        let entries = fs::read_dir(&self.storage_path).map_err(|source| {
            RegistryError::Unavailable {
                path: self.storage_path.clone(),
                source,
            }
        })?;

        let mut found = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| RegistryError::Unavailable {
                path: self.storage_path.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() || !path.join(CASE_MARKER).is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    found.insert(name);
                }
                Err(name) => {
                    warn!(name = %name.to_string_lossy(), "skipping non-UTF-8 case directory");
                }
            }
        }

        debug!(path = %self.storage_path.display(), cases = found.len(), "scanned storage");
        *self.known.write() = found;
        Ok(())
    }

    /// Create a case directory with its marker, without mounting it.
    ///
    /// Registering an already-known case is a no-op. Returns the case
    /// directory.
    pub fn register(&self, name: &str) -> Result<PathBuf, RegistryError> {
        validate_case_name(name)?;
        let root = self.case_root(name);
        if self.exists(name) {
            return Ok(root);
        }

        let write_marker = || -> io::Result<()> {
            fs::create_dir_all(&root)?;
            let info = CaseInfo {
                name: name.to_string(),
                format_version: CASE_FORMAT_VERSION,
            };
            let json = serde_json::to_vec_pretty(&info).expect("marker serialization");
            fs::write(root.join(CASE_MARKER), json)
        };
        write_marker().map_err(|source| RegistryError::Register {
            name: name.to_string(),
            source,
        })?;

        self.known.write().insert(name.to_string());
        debug!(case = %name, path = %root.display(), "registered case");
        Ok(root)
    }
}

/// Case names are used verbatim as directory names.
fn validate_case_name(name: &str) -> Result<(), RegistryError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidCaseName(name.to_string()))
    }
}
