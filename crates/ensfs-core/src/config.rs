//! Manager configuration.
//!
//! Every configurable option is an explicit, typed field on
//! [`ManagerConfig`]. There is no dynamic attribute lookup: an option that
//! is not named here does not exist.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Default number of case filesystems kept mounted at once.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(5).unwrap();

/// Default directory name for case storage under the ensemble root.
pub const DEFAULT_STORAGE_DIR: &str = "storage";

/// How an unknown case name is treated by a mount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPolicy {
    /// Mounting an unregistered case fails; cases must be created first.
    #[default]
    RequireRegistered,
    /// Mounting an unregistered case registers a new case directory.
    CreateOnDemand,
}

/// Access mode for a mounted case filesystem.
///
/// Read-write mounts take the per-case writer lock; read-only mounts do
/// not, and reject writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountMode {
    /// Full access. At most one read-write mount per case directory.
    #[default]
    ReadWrite,
    /// Read access only. No writer lock is taken.
    ReadOnly,
}

/// Configuration for an [`FsManager`](crate::FsManager).
///
/// # Example
///
/// ```
/// use ensfs_core::{ManagerConfig, MountPolicy};
/// use std::num::NonZeroUsize;
///
/// let config = ManagerConfig {
///     capacity: NonZeroUsize::new(2).unwrap(),
///     mount_policy: MountPolicy::CreateOnDemand,
///     ..ManagerConfig::default()
/// };
/// assert_eq!(config.capacity.get(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of concurrently mounted case filesystems.
    pub capacity: NonZeroUsize,
    /// Directory name for case storage under the ensemble root.
    pub storage_dir: String,
    /// Treatment of mount requests for unregistered case names.
    pub mount_policy: MountPolicy,
    /// Access mode used for every mount performed by the manager.
    pub mount_mode: MountMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            storage_dir: DEFAULT_STORAGE_DIR.to_string(),
            mount_policy: MountPolicy::default(),
            mount_mode: MountMode::default(),
        }
    }
}

impl ManagerConfig {
    /// Default configuration with a custom capacity.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}
