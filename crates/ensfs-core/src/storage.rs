//! Storage backend abstraction for case filesystems.
//!
//! The manager treats on-disk case storage as an opaque resource behind two
//! traits:
//!
//! - [`StorageBackend`]: opens the storage for one case directory
//! - [`StorageResource`]: the open resource; block reads/writes, flush,
//!   close, validity probe
//!
//! [`BlockStorage`] is the default backend: one file per block under
//! `blocks/` inside the case directory, writes buffered in memory until
//! flush. Read-write opens take an exclusive advisory lock on a `case.lock`
//! file so that a case directory has at most one writer at a time, across
//! processes. Read-only opens take no lock.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::MountMode;

/// Name of the per-case writer lock file.
pub const LOCK_FILE: &str = "case.lock";

/// Name of the block directory inside a case directory.
pub const BLOCKS_DIR: &str = "blocks";

/// Errors raised while opening case storage.
#[derive(Error, Debug)]
pub enum MountError {
    /// The case directory does not exist.
    #[error("case storage path does not exist: {0}")]
    NotFound(PathBuf),

    /// Opening the storage failed at the filesystem level.
    #[error("failed to open case storage at {path}: {source}")]
    Open {
        /// The case directory.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The on-disk layout is not a usable case directory.
    #[error("case storage at {path} is corrupt: {reason}")]
    Corrupt {
        /// The case directory.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Another writer holds the lock on this case directory.
    #[error("case storage at {path} is already write-mounted")]
    Locked {
        /// The case directory.
        path: PathBuf,
    },
}

/// An open case-storage resource.
///
/// Writes are buffered until [`flush`](StorageResource::flush). A resource
/// that failed to flush keeps its pending writes so the flush can be
/// retried.
pub trait StorageResource: Send + fmt::Debug {
    /// Buffer `data` under `key`, replacing any pending or persisted block.
    fn write_block(&mut self, key: &str, data: &[u8]) -> io::Result<()>;

    /// Read a block, preferring pending (unflushed) content.
    fn read_block(&mut self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Persist all pending writes.
    fn flush(&mut self) -> io::Result<()>;

    /// Release the underlying resource. Pending writes are dropped; callers
    /// flush first.
    fn close(&mut self) -> io::Result<()>;

    /// Whether the resource still points at usable storage.
    fn is_valid(&self) -> bool;
}

/// Opens [`StorageResource`]s for case directories.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Open the storage for the case directory at `path`.
    fn open(&self, path: &Path, mode: MountMode)
    -> Result<Box<dyn StorageResource>, MountError>;
}

/// The default on-disk storage backend.
///
/// Layout per case directory:
///
/// ```text
/// <case>/
///   case_info.json     registry marker (written by the registry)
///   case.lock          present while write-mounted
///   blocks/<key>       one file per persisted block
/// ```
#[derive(Debug, Default, Clone)]
pub struct BlockStorage;

impl BlockStorage {
    /// Create the default backend.
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for BlockStorage {
    fn open(
        &self,
        path: &Path,
        mode: MountMode,
    ) -> Result<Box<dyn StorageResource>, MountError> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Err(MountError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(MountError::Open {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !meta.is_dir() {
            return Err(MountError::Corrupt {
                path: path.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let blocks_dir = path.join(BLOCKS_DIR);
        if blocks_dir.exists() && !blocks_dir.is_dir() {
            return Err(MountError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("{BLOCKS_DIR} entry is not a directory"),
            });
        }

        let lock = match mode {
            MountMode::ReadWrite => {
                fs::create_dir_all(&blocks_dir).map_err(|source| MountError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                Some(take_writer_lock(path)?)
            }
            MountMode::ReadOnly => None,
        };

        debug!(path = %path.display(), ?mode, "opened block storage");
        Ok(Box::new(BlockResource {
            dir: path.to_path_buf(),
            blocks_dir,
            read_only: mode == MountMode::ReadOnly,
            lock,
            pending: HashMap::new(),
            closed: false,
        }))
    }
}

/// Create the lock file and take an exclusive advisory lock on it.
fn take_writer_lock(path: &Path) -> Result<File, MountError> {
    let lock_path = path.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|source| MountError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(source) if source.kind() == io::ErrorKind::WouldBlock => Err(MountError::Locked {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(MountError::Open {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Block keys become file names; keep them to a single path component.
fn validate_key(key: &str) -> io::Result<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid block key: {key:?}"),
        ))
    }
}

struct BlockResource {
    dir: PathBuf,
    blocks_dir: PathBuf,
    read_only: bool,
    lock: Option<File>,
    pending: HashMap<String, Vec<u8>>,
    closed: bool,
}

impl fmt::Debug for BlockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockResource")
            .field("dir", &self.dir)
            .field("read_only", &self.read_only)
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl BlockResource {
    /// Write one block file atomically: temp file, fsync, rename.
    fn persist_block(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let tmp_path = self.blocks_dir.join(format!(".{key}.tmp"));
        let final_path = self.blocks_dir.join(key);
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(data)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        trace!(path = %final_path.display(), bytes = data.len(), "persisted block");
        Ok(())
    }
}

impl StorageResource for BlockResource {
    fn write_block(&mut self, key: &str, data: &[u8]) -> io::Result<()> {
        validate_key(key)?;
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
        validate_key(key)?;
        if let Some(data) = self.pending.get(key) {
            return Ok(Some(data.clone()));
        }
        match fs::read(self.blocks_dir.join(key)) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut entries: Vec<(String, Vec<u8>)> = self.pending.drain().collect();
        let total = entries.len();
        while let Some((key, data)) = entries.pop() {
            if let Err(err) = self.persist_block(&key, &data) {
                // Put back what was not written so a retry is complete.
                self.pending.insert(key, data);
                self.pending.extend(entries);
                return Err(err);
            }
        }
        debug!(path = %self.dir.display(), blocks = total, "flushed block storage");
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        if let Some(lock) = self.lock.take() {
            let _ = FileExt::unlock(&lock);
            drop(lock);
            match fs::remove_file(self.dir.join(LOCK_FILE)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        debug!(path = %self.dir.display(), "closed block storage");
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.closed && self.dir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case_dir(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join("case0");
        fs::create_dir(&dir).unwrap();
        dir
    }

    #[test]
    fn test_open_missing_path() {
        let tmp = TempDir::new().unwrap();
        let err = BlockStorage::new()
            .open(&tmp.path().join("nope"), MountMode::ReadWrite)
            .unwrap_err();
        assert!(matches!(err, MountError::NotFound(_)));
    }

    #[test]
    fn test_open_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("case0");
        fs::write(&path, b"not a dir").unwrap();
        let err = BlockStorage::new()
            .open(&path, MountMode::ReadWrite)
            .unwrap_err();
        assert!(matches!(err, MountError::Corrupt { .. }));
    }

    #[test]
    fn test_write_flush_read() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let mut res = BlockStorage::new().open(&dir, MountMode::ReadWrite).unwrap();

        res.write_block("PERM", b"a=1").unwrap();
        // Pending writes are readable before flush.
        assert_eq!(res.read_block("PERM").unwrap().unwrap(), b"a=1");
        assert!(!dir.join(BLOCKS_DIR).join("PERM").exists());

        res.flush().unwrap();
        assert!(dir.join(BLOCKS_DIR).join("PERM").exists());
        assert_eq!(res.read_block("PERM").unwrap().unwrap(), b"a=1");
        res.close().unwrap();
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let mut res = BlockStorage::new().open(&dir, MountMode::ReadOnly).unwrap();
        let err = res.write_block("PERM", b"a=1").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_writer_lock_exclusion() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let backend = BlockStorage::new();

        let mut first = backend.open(&dir, MountMode::ReadWrite).unwrap();
        assert!(dir.join(LOCK_FILE).exists());

        // A second writer is rejected; a reader is fine.
        let err = backend.open(&dir, MountMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MountError::Locked { .. }));
        let mut reader = backend.open(&dir, MountMode::ReadOnly).unwrap();
        reader.close().unwrap();

        first.close().unwrap();
        assert!(!dir.join(LOCK_FILE).exists());

        // Lock is free again after close.
        let mut second = backend.open(&dir, MountMode::ReadWrite).unwrap();
        second.close().unwrap();
    }

    #[test]
    fn test_read_only_takes_no_lock() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let mut res = BlockStorage::new().open(&dir, MountMode::ReadOnly).unwrap();
        assert!(!dir.join(LOCK_FILE).exists());
        res.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let mut res = BlockStorage::new().open(&dir, MountMode::ReadWrite).unwrap();
        res.close().unwrap();
        res.close().unwrap();
    }

    #[test]
    fn test_invalid_block_keys() {
        let tmp = TempDir::new().unwrap();
        let dir = case_dir(&tmp);
        let mut res = BlockStorage::new().open(&dir, MountMode::ReadWrite).unwrap();
        for key in ["", "a/b", "..", ".hidden"] {
            let err = res.write_block(key, b"x").unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "key {key:?}");
        }
        res.close().unwrap();
    }
}
