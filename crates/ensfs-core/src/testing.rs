//! Test support: an in-memory storage backend with fault injection.
//!
//! Used by the integration suites (and downstream consumers' tests) to
//! exercise the manager without touching disk, and to inject storage
//! failures at exact points in the mount/evict sequence.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::MountMode;
use crate::storage::{MountError, StorageBackend, StorageResource};

#[derive(Debug, Default)]
struct MemoryState {
    blocks: Mutex<HashMap<PathBuf, HashMap<String, Vec<u8>>>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    fail_flush: AtomicBool,
    fail_open: AtomicBool,
}

/// In-memory storage backend.
///
/// All clones share one store, so a test can keep a clone for inspection
/// after handing the backend to a manager. `fail_*` toggles make the next
/// operations of that kind fail with an injected I/O error until cleared.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every flush fail while set.
    pub fn fail_flush(&self, fail: bool) {
        self.state.fail_flush.store(fail, Ordering::Release);
    }

    /// Make every open fail while set.
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::Release);
    }

    /// Number of successful resource flushes across all cases.
    pub fn flush_count(&self) -> usize {
        self.state.flushes.load(Ordering::Acquire)
    }

    /// Number of resource closes across all cases.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::Acquire)
    }

    /// A persisted (flushed) block for the case mounted at `case`.
    pub fn block(&self, case: &Path, key: &str) -> Option<Vec<u8>> {
        self.state
            .blocks
            .lock()
            .get(case)
            .and_then(|blocks| blocks.get(key).cloned())
    }
}

impl StorageBackend for MemoryBackend {
    fn open(
        &self,
        path: &Path,
        mode: MountMode,
    ) -> Result<Box<dyn StorageResource>, MountError> {
        if self.state.fail_open.load(Ordering::Acquire) {
            return Err(MountError::Open {
                path: path.to_path_buf(),
                source: io::Error::other("injected open failure"),
            });
        }
        self.state
            .blocks
            .lock()
            .entry(path.to_path_buf())
            .or_default();
        Ok(Box::new(MemoryResource {
            case: path.to_path_buf(),
            state: Arc::clone(&self.state),
            pending: HashMap::new(),
            read_only: mode == MountMode::ReadOnly,
            closed: false,
        }))
    }
}

struct MemoryResource {
    case: PathBuf,
    state: Arc<MemoryState>,
    pending: HashMap<String, Vec<u8>>,
    read_only: bool,
    closed: bool,
}

impl fmt::Debug for MemoryResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryResource")
            .field("case", &self.case)
            .field("pending", &self.pending.len())
            .field("read_only", &self.read_only)
            .field("closed", &self.closed)
            .finish()
    }
}

impl StorageResource for MemoryResource {
    fn write_block(&mut self, key: &str, data: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "storage is mounted read-only",
            ));
        }
        self.pending.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn read_block(&mut self, key: &str) -> io::Result<Option<Vec<u8>>> {
        if let Some(data) = self.pending.get(key) {
            return Ok(Some(data.clone()));
        }
        Ok(self
            .state
            .blocks
            .lock()
            .get(&self.case)
            .and_then(|blocks| blocks.get(key).cloned()))
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.state.fail_flush.load(Ordering::Acquire) {
            return Err(io::Error::other("injected flush failure"));
        }
        let mut store = self.state.blocks.lock();
        let blocks = store.entry(self.case.clone()).or_default();
        for (key, data) in self.pending.drain() {
            blocks.insert(key, data);
        }
        self.state.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.pending.clear();
        self.state.closes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.closed
    }
}
