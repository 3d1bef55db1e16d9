//! Mounted-case handles and their reference counting.
//!
//! A [`CaseHandle`] owns the open storage resource for one mounted case.
//! Callers never hold a handle directly; they hold a [`CaseRef`] guard that
//! increments the reference count on acquisition and decrements it on drop.
//! Eviction decisions read that count, so it is exact, not garbage-collector
//! timing.
//!
//! # Handle Lifecycle
//!
//! 1. **Mount**: created on cache miss; the storage resource is opened and
//!    validated.
//! 2. **Acquire/Release**: callers take [`CaseRef`] guards; the handle stays
//!    resident in the cache even at zero references.
//! 3. **Retire**: eviction removes the handle from the cache. With no
//!    references outstanding it closes immediately; otherwise the last
//!    released guard closes it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MountMode;
use crate::storage::{MountError, StorageBackend, StorageResource};

/// Errors raised by operations on a mounted handle.
#[derive(Error, Debug)]
pub enum HandleError {
    /// Flushing pending writes failed; the dirty flag stays set.
    #[error("flush of case {name} failed: {source}")]
    Flush {
        /// The case name.
        name: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Releasing the storage resource failed.
    #[error("close of case {name} failed: {source}")]
    Close {
        /// The case name.
        name: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The handle was already closed.
    #[error("case {name} is closed")]
    Closed {
        /// The case name.
        name: String,
    },

    /// The handle was mounted read-only.
    #[error("case {name} is mounted read-only")]
    ReadOnly {
        /// The case name.
        name: String,
    },

    /// A storage operation failed.
    #[error("I/O error on case {name}: {source}")]
    Io {
        /// The case name.
        name: String,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Close was requested while references were still outstanding. This is
    /// a programming error in the caller, not a runtime condition.
    #[error("close of case {name} with {refcount} outstanding references")]
    InvariantViolation {
        /// The case name.
        name: String,
        /// The reference count observed at close.
        refcount: u32,
    },
}

/// One mounted case filesystem.
///
/// The handle is owned by the manager's cache; everything on it takes
/// `&self` and is safe to call from multiple threads. The storage resource
/// itself sits behind a mutex, the bookkeeping flags are atomics.
#[derive(Debug)]
pub struct CaseHandle {
    name: String,
    root: PathBuf,
    mode: MountMode,
    refcount: AtomicU32,
    dirty: AtomicBool,
    retired: AtomicBool,
    resource: Mutex<Option<Box<dyn StorageResource>>>,
}

impl CaseHandle {
    /// Mount the case at `root` through `backend`.
    pub(crate) fn mount(
        backend: &dyn StorageBackend,
        name: &str,
        root: &Path,
        mode: MountMode,
    ) -> Result<Arc<Self>, MountError> {
        let resource = backend.open(root, mode)?;
        if !resource.is_valid() {
            return Err(MountError::Corrupt {
                path: root.to_path_buf(),
                reason: "storage resource reported invalid".to_string(),
            });
        }
        debug!(case = %name, path = %root.display(), ?mode, "mounted case");
        Ok(Arc::new(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            mode,
            refcount: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            resource: Mutex::new(Some(resource)),
        }))
    }

    /// The case name this handle is mounted for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The on-disk case directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The access mode this handle was mounted with.
    pub fn mode(&self) -> MountMode {
        self.mode
    }

    /// Current number of outstanding [`CaseRef`] guards.
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Whether the handle has unflushed writes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Whether the storage resource is still open.
    pub fn is_open(&self) -> bool {
        self.resource.lock().is_some()
    }

    /// Take a counted reference to this handle.
    pub(crate) fn acquire(self: &Arc<Self>) -> CaseRef {
        self.refcount.fetch_add(1, Ordering::AcqRel);
        CaseRef {
            handle: Arc::clone(self),
        }
    }

    /// Buffer a write. Sets the dirty flag.
    pub fn write_block(&self, key: &str, data: &[u8]) -> Result<(), HandleError> {
        if self.mode == MountMode::ReadOnly {
            return Err(HandleError::ReadOnly {
                name: self.name.clone(),
            });
        }
        let mut guard = self.resource.lock();
        let resource = guard.as_mut().ok_or_else(|| HandleError::Closed {
            name: self.name.clone(),
        })?;
        resource.write_block(key, data).map_err(|source| HandleError::Io {
            name: self.name.clone(),
            source,
        })?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Read a block, preferring unflushed content.
    pub fn read_block(&self, key: &str) -> Result<Option<Vec<u8>>, HandleError> {
        let mut guard = self.resource.lock();
        let resource = guard.as_mut().ok_or_else(|| HandleError::Closed {
            name: self.name.clone(),
        })?;
        resource.read_block(key).map_err(|source| HandleError::Io {
            name: self.name.clone(),
            source,
        })
    }

    /// Persist pending writes. No-op when clean or already closed.
    ///
    /// On failure the dirty flag stays set, so calling flush again retries
    /// the same writes.
    pub fn flush(&self) -> Result<(), HandleError> {
        let mut guard = self.resource.lock();
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(resource) = guard.as_mut() else {
            return Ok(());
        };
        resource.flush().map_err(|source| HandleError::Flush {
            name: self.name.clone(),
            source,
        })?;
        self.dirty.store(false, Ordering::Release);
        debug!(case = %self.name, "flushed case");
        Ok(())
    }

    /// Release the storage resource.
    ///
    /// A handle may only be closed once its reference count is zero;
    /// anything else is [`HandleError::InvariantViolation`]. Closing an
    /// already-closed handle is a no-op.
    pub fn close(&self) -> Result<(), HandleError> {
        let refcount = self.refcount.load(Ordering::Acquire);
        if refcount != 0 {
            return Err(HandleError::InvariantViolation {
                name: self.name.clone(),
                refcount,
            });
        }
        let mut guard = self.resource.lock();
        let Some(mut resource) = guard.take() else {
            return Ok(());
        };
        resource.close().map_err(|source| HandleError::Close {
            name: self.name.clone(),
            source,
        })?;
        debug!(case = %self.name, "closed case");
        Ok(())
    }

    /// Mark the handle as evicted from the cache and close it if no
    /// references are outstanding. Otherwise the last released [`CaseRef`]
    /// performs the close.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        if self.refcount.load(Ordering::Acquire) == 0 {
            if let Err(error) = self.close() {
                warn!(case = %self.name, %error, "close of retired case failed");
            }
        }
    }
}

/// A counted reference to a mounted case.
///
/// Dereferences to [`CaseHandle`]. Dropping the guard releases the
/// reference; the last guard dropped on a retired handle flushes and closes
/// it.
#[derive(Debug)]
pub struct CaseRef {
    handle: Arc<CaseHandle>,
}

impl std::ops::Deref for CaseRef {
    type Target = CaseHandle;

    fn deref(&self) -> &CaseHandle {
        &self.handle
    }
}

impl Clone for CaseRef {
    fn clone(&self) -> Self {
        self.handle.acquire()
    }
}

impl Drop for CaseRef {
    fn drop(&mut self) {
        let previous = self.handle.refcount.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "reference count underflow");
        if previous == 1 && self.handle.retired.load(Ordering::Acquire) {
            if let Err(error) = self.handle.flush() {
                warn!(case = %self.handle.name, %error, "flush of retired case failed");
            }
            if let Err(error) = self.handle.close() {
                warn!(case = %self.handle.name, %error, "close of retired case failed");
            }
        }
    }
}
