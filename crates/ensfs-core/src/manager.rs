//! The ensemble filesystem manager.
//!
//! One [`FsManager`] per open ensemble root. It owns the bounded cache of
//! mounted case handles, the case registry, and the storage backend, and it
//! tracks the "current case" selection that callers use as a default.
//!
//! # Concurrency
//!
//! Every cache mutation runs under one mutex per manager: the whole
//! check-table, evict-if-needed, mount, insert sequence is a single
//! critical section, so concurrent callers never observe a half-completed
//! rotation. The lock is deliberately coarse; the callers are a handful of
//! worker threads, not thousands, and mounts are rare next to lookups.
//! Guard release (reference-count decrement) never takes the manager lock.
//!
//! # Construction
//!
//! Managers are constructed explicitly and passed by reference to every
//! consumer. There is no process-global instance.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ManagerConfig, MountPolicy};
use crate::handle::{CaseHandle, CaseRef, HandleError};
use crate::registry::{CaseRegistry, RegistryError};
use crate::slots::SlotTable;
use crate::stats::{ManagerStats, StatsSnapshot};
use crate::storage::{BlockStorage, MountError, StorageBackend};

/// Errors surfaced by [`FsManager`] operations.
#[derive(Error, Debug)]
pub enum FsManagerError {
    /// The requested case is not in the registry. Recoverable: the caller
    /// may register the case and retry.
    #[error("unknown case: {0}")]
    UnknownCase(String),

    /// No current case has been selected.
    #[error("no current case selected")]
    NoCurrentCase,

    /// The cache is full and no resident case can be evicted. Recoverable:
    /// the caller may release references or raise the capacity.
    #[error("cache capacity {capacity} exceeded and no resident case is evictable")]
    CapacityExceeded {
        /// The configured capacity.
        capacity: usize,
    },

    /// Mounting case storage failed.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// A flush or close on a mounted handle failed.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// The registry could not be read or written.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// State guarded by the manager mutex.
#[derive(Debug)]
struct ManagerState {
    slots: SlotTable,
    current: Option<String>,
}

/// Mounts, caches, and evicts case filesystems for one ensemble root.
///
/// # Example
///
/// ```
/// use ensfs_core::{FsManager, ManagerConfig, MountPolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let config = ManagerConfig {
///     mount_policy: MountPolicy::CreateOnDemand,
///     ..ManagerConfig::default()
/// };
/// let manager = FsManager::open(dir.path(), config)?;
///
/// let fs = manager.get_file_system("default")?;
/// fs.write_block("PERM", b"a=1")?;
/// fs.flush()?;
///
/// assert_eq!(manager.file_system_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FsManager {
    config: ManagerConfig,
    root: PathBuf,
    backend: Box<dyn StorageBackend>,
    registry: CaseRegistry,
    state: Mutex<ManagerState>,
    stats: ManagerStats,
    last_error: Mutex<Option<String>>,
}

impl FsManager {
    /// Open a manager over `root` with the default on-disk backend.
    ///
    /// Creates `<root>/<storage_dir>` if it does not exist yet.
    pub fn open(root: impl Into<PathBuf>, config: ManagerConfig) -> Result<Self, FsManagerError> {
        Self::with_backend(root, config, Box::new(BlockStorage::new()))
    }

    /// Open a manager with a custom storage backend.
    pub fn with_backend(
        root: impl Into<PathBuf>,
        config: ManagerConfig,
        backend: Box<dyn StorageBackend>,
    ) -> Result<Self, FsManagerError> {
        let root = root.into();
        let storage_path = root.join(&config.storage_dir);
        fs::create_dir_all(&storage_path).map_err(|source| RegistryError::Unavailable {
            path: storage_path.clone(),
            source,
        })?;
        let registry = CaseRegistry::open(storage_path)?;
        info!(
            root = %root.display(),
            capacity = config.capacity.get(),
            "opened ensemble filesystem manager"
        );
        Ok(Self {
            state: Mutex::new(ManagerState {
                slots: SlotTable::new(config.capacity.get()),
                current: None,
            }),
            registry,
            backend,
            stats: ManagerStats::new(),
            last_error: Mutex::new(None),
            config,
            root,
        })
    }

    /// The ensemble root this manager was opened over.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured cache capacity.
    pub fn capacity(&self) -> usize {
        self.config.capacity.get()
    }

    /// The case registry for this ensemble root.
    pub fn registry(&self) -> &CaseRegistry {
        &self.registry
    }

    /// Get the filesystem for a named case, mounting it on a cache miss.
    ///
    /// Repeated calls with the same name return references to the same
    /// underlying handle, never a second mount. On a miss with the cache
    /// full, one resident case is evicted first: its pending writes are
    /// flushed, and a flush failure aborts this mount with the cache
    /// unchanged.
    pub fn get_file_system(&self, name: &str) -> Result<CaseRef, FsManagerError> {
        let result = self.get_file_system_inner(name);
        self.record(result)
    }

    /// Get the filesystem for the current case.
    pub fn get_current_file_system(&self) -> Result<CaseRef, FsManagerError> {
        let current = self.state.lock().current.clone();
        match current {
            Some(name) => self.get_file_system(&name),
            None => self.record(Err(FsManagerError::NoCurrentCase)),
        }
    }

    /// Number of currently mounted case filesystems. Never exceeds
    /// [`capacity`](Self::capacity).
    pub fn file_system_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Names of the currently mounted cases, in mount order.
    pub fn mounted_cases(&self) -> Vec<String> {
        self.state.lock().slots.names()
    }

    /// The current case selection, if any.
    pub fn current_case(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    /// Select the current case. The selection is exempt from eviction
    /// while any other resident case exists.
    pub fn set_current_case(&self, name: &str) -> Result<(), FsManagerError> {
        let result = (|| {
            let mut state = self.state.lock();
            if !self.registry.exists(name) {
                self.registry.refresh()?;
            }
            if !self.registry.exists(name) {
                return Err(FsManagerError::UnknownCase(name.to_string()));
            }
            state.current = Some(name.to_string());
            debug!(case = %name, "selected current case");
            Ok(())
        })();
        self.record(result)
    }

    /// Evict one resident case even without capacity pressure, to release
    /// its resources early. Returns the evicted case name, or `None` when
    /// nothing is evictable.
    pub fn rotate(&self) -> Result<Option<String>, FsManagerError> {
        let result = (|| {
            let mut state = self.state.lock();
            self.evict_one(&mut state)
        })();
        self.record(result)
    }

    /// The most recent failure description, for reporting layers that
    /// cannot consume typed errors directly.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Statistics snapshot for this manager.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Flush and close every resident case. Handles still referenced by
    /// callers are retired and close when their last reference drops.
    ///
    /// Also runs on drop; calling it explicitly first is harmless.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        for (name, handle) in state.slots.drain() {
            if let Err(error) = handle.flush() {
                warn!(case = %name, %error, "flush during shutdown failed");
            }
            let refcount = handle.refcount();
            if refcount > 0 {
                warn!(case = %name, refcount, "case still referenced at shutdown");
            }
            handle.retire();
        }
        debug!(root = %self.root.display(), "manager shut down");
    }

    fn get_file_system_inner(&self, name: &str) -> Result<CaseRef, FsManagerError> {
        let mut state = self.state.lock();

        if let Some(handle) = state.slots.get(name) {
            self.stats.record_hit();
            debug!(case = %name, "cache hit");
            return Ok(handle.acquire());
        }
        self.stats.record_miss();

        if state.slots.is_full() && self.evict_one(&mut state)?.is_none() {
            return Err(FsManagerError::CapacityExceeded {
                capacity: self.config.capacity.get(),
            });
        }

        let case_root = self.resolve_case(name)?;
        let handle =
            CaseHandle::mount(self.backend.as_ref(), name, &case_root, self.config.mount_mode)?;
        self.stats.record_mount();
        let guard = handle.acquire();
        state.slots.insert(name.to_string(), handle);
        Ok(guard)
    }

    /// Map a case name to its on-disk directory, applying the mount policy
    /// for unknown names. Rescans the registry once before giving up, so
    /// cases created by other processes are found.
    fn resolve_case(&self, name: &str) -> Result<PathBuf, FsManagerError> {
        if !self.registry.exists(name) {
            self.registry.refresh()?;
        }
        if self.registry.exists(name) {
            return Ok(self.registry.case_root(name));
        }
        match self.config.mount_policy {
            MountPolicy::RequireRegistered => Err(FsManagerError::UnknownCase(name.to_string())),
            MountPolicy::CreateOnDemand => Ok(self.registry.register(name)?),
        }
    }

    /// Evict the least-needed resident case: flush it, then remove and
    /// retire it. A flush failure leaves the cache unchanged. Returns
    /// `None` when nothing is evictable.
    fn evict_one(&self, state: &mut ManagerState) -> Result<Option<String>, FsManagerError> {
        let Ok(victim) = state.slots.pick_victim(state.current.as_deref()) else {
            return Ok(None);
        };

        let handle = state
            .slots
            .get(&victim)
            .expect("picked victim is resident")
            .clone();
        handle.flush()?;

        let handle = state
            .slots
            .remove(&victim)
            .expect("picked victim is resident");
        handle.retire();
        self.stats.record_eviction();
        info!(case = %victim, "evicted case filesystem");
        Ok(Some(victim))
    }

    fn record<T>(&self, result: Result<T, FsManagerError>) -> Result<T, FsManagerError> {
        if let Err(error) = &result {
            *self.last_error.lock() = Some(error.to_string());
        }
        result
    }
}

impl Drop for FsManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
