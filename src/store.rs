//! Durable storage for the task data file.
//!
//! A single JSON document owns all tasks:
//!
//! ```text
//! {
//!   "version": 12,
//!   "metadata": { "schema_version": "tjm.todo.v1", "last_modified": "..." },
//!   "tasks": { "<id>": { ... }, ... }   // insertion-ordered
//! }
//! ```
//!
//! The store is the only component that touches the filesystem. Writes are
//! temp + fsync + rename, guarded by a sidecar lock file, so the live file is
//! always a complete document.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::task::Task;

/// Schema identifier written into every data file
pub const SCHEMA_VERSION: &str = "tjm.todo.v1";

/// Metadata block of the data file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    pub schema_version: String,
    pub last_modified: DateTime<Utc>,
}

/// The persisted aggregate: every task, keyed by id in creation order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoDataFile {
    /// Bumped on every committed mutation
    pub version: u64,
    pub metadata: FileMetadata,
    pub tasks: IndexMap<String, Task>,
}

impl TodoDataFile {
    pub fn empty() -> Self {
        Self {
            version: 0,
            metadata: FileMetadata {
                schema_version: SCHEMA_VERSION.to_string(),
                last_modified: Utc::now(),
            },
            tasks: IndexMap::new(),
        }
    }
}

/// When mutations reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Every committed mutation is written through synchronously
    Immediate,
    /// Mutations stay in memory until an explicit `flush_batch`
    Batched,
}

/// Owner of the on-disk data file
#[derive(Debug)]
pub struct DurableStore {
    path: PathBuf,
    mode: PersistenceMode,
    dirty: bool,
    lock_timeout_ms: u64,
}

impl DurableStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            mode: PersistenceMode::Immediate,
            dirty: false,
            lock_timeout_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }

    /// Switch persistence mode. Switching away from batched mode does not
    /// flush; callers flush explicitly before restoring immediate mode.
    pub fn set_mode(&mut self, mode: PersistenceMode) {
        self.mode = mode;
    }

    /// True when batched mutations are waiting for a flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Load the most recently flushed state; a missing file is an empty one.
    pub fn load(&self) -> Result<TodoDataFile> {
        if !self.path.exists() {
            return Ok(TodoDataFile::empty());
        }

        let content = fs::read_to_string(&self.path)?;
        let data: TodoDataFile = serde_json::from_str(&content)?;
        if data.metadata.schema_version != SCHEMA_VERSION {
            return Err(Error::Validation(format!(
                "unsupported schema version '{}' in {}",
                data.metadata.schema_version,
                self.path.display()
            )));
        }
        Ok(data)
    }

    /// Write the full document to disk atomically.
    pub fn save(&self, data: &TodoDataFile) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let _lock = FileLock::acquire(lock::lock_path_for(&self.path), self.lock_timeout_ms)?;
        lock::write_atomic(&self.path, json.as_bytes())?;
        debug!(version = data.version, path = %self.path.display(), "data file written");
        Ok(())
    }

    /// Commit a mutation: bump the version counter and either write through
    /// (immediate mode) or mark the document dirty (batched mode).
    ///
    /// On a write failure the version bump is reverted so the in-memory
    /// document still mirrors the on-disk state.
    pub fn persist(&mut self, data: &mut TodoDataFile) -> Result<()> {
        let prev_modified = data.metadata.last_modified;
        data.version += 1;
        data.metadata.last_modified = Utc::now();

        match self.mode {
            PersistenceMode::Immediate => {
                if let Err(err) = self.save(data) {
                    data.version -= 1;
                    data.metadata.last_modified = prev_modified;
                    return Err(err);
                }
                Ok(())
            }
            PersistenceMode::Batched => {
                self.dirty = true;
                Ok(())
            }
        }
    }

    /// Flush batched mutations with a single atomic write.
    pub fn flush_batch(&mut self, data: &TodoDataFile) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.save(data)?;
        self.dirty = false;
        Ok(())
    }
}
