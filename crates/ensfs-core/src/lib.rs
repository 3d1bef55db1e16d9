//! Bounded cache of mounted ensemble case filesystems.
//!
//! An ensemble root holds one storage directory per named case (a
//! realization set). Opening a case's storage is expensive and the number
//! of concurrently open cases must stay bounded, so all access goes through
//! an [`FsManager`]: it mounts cases on demand, caches the open handles up
//! to a fixed capacity, and evicts the least-needed case (flushing it
//! first) when a new mount needs a slot.
//!
//! # Components
//!
//! - [`FsManager`] - mounts, caches, and evicts case filesystems; tracks
//!   the current-case selection
//! - [`CaseRef`] / [`CaseHandle`] - counted references to one mounted case
//! - [`CaseRegistry`] - the set of known case names under the root,
//!   independent of mount state
//! - [`StorageBackend`] / [`StorageResource`] - the seam to the underlying
//!   case storage; [`BlockStorage`] is the on-disk default
//! - [`ManagerConfig`] - capacity, storage directory, mount policy and mode
//! - [`ManagerStats`] - hit/miss/mount/eviction counters
//!
//! # Guarantees
//!
//! - At most one mount per case name: repeated [`FsManager::get_file_system`]
//!   calls for one name share one handle.
//! - [`FsManager::file_system_count`] never exceeds the configured
//!   capacity.
//! - The current case is never evicted while any alternative exists.
//! - At most one writer per case directory, across processes, enforced by
//!   an advisory lock on `case.lock`.
//!
//! # Example
//!
//! ```
//! use ensfs_core::{FsManager, ManagerConfig, MountPolicy};
//! use std::num::NonZeroUsize;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = tempfile::tempdir()?;
//! let manager = FsManager::open(
//!     root.path(),
//!     ManagerConfig {
//!         capacity: NonZeroUsize::new(2).unwrap(),
//!         mount_policy: MountPolicy::CreateOnDemand,
//!         ..ManagerConfig::default()
//!     },
//! )?;
//!
//! // Three cases through a two-slot cache: the oldest idle case rotates out.
//! for name in ["c0", "c1", "c2"] {
//!     let fs = manager.get_file_system(name)?;
//!     fs.write_block("PERM", b"a=1")?;
//!     fs.flush()?;
//! }
//! assert_eq!(manager.file_system_count(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod handle;
mod manager;
mod registry;
mod slots;
mod stats;
mod storage;

/// Test support: in-memory backend with fault injection.
pub mod testing;

pub use config::{
    DEFAULT_CAPACITY, DEFAULT_STORAGE_DIR, ManagerConfig, MountMode, MountPolicy,
};
pub use handle::{CaseHandle, CaseRef, HandleError};
pub use manager::{FsManager, FsManagerError};
pub use registry::{CASE_MARKER, CaseRegistry, RegistryError};
pub use slots::{NoEvictableEntry, SlotTable};
pub use stats::{ManagerStats, StatsSnapshot};
pub use storage::{
    BLOCKS_DIR, BlockStorage, LOCK_FILE, MountError, StorageBackend, StorageResource,
};
