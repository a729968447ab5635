//! Post-commit change notifications.
//!
//! After every successful commit the repository hands a [`ChangeEvent`] to
//! each subscribed sink. This is the hook a markdown-mirroring layer (or any
//! other collaborator) attaches to; the engine itself knows nothing about
//! what subscribers do. Sink failures are logged and never fail the
//! operation that produced the event.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub const EVENT_SCHEMA_VERSION: &str = "tjm.event.v1";

/// What kind of commit produced the event
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskArchived,
    /// Emitted by undo when prior state is replayed
    TaskRestored,
    BulkApplied,
}

/// A structured post-commit event
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub schema_version: &'static str,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
    /// Canonical ids of every task the commit touched
    pub task_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, task_ids: Vec<String>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            kind,
            timestamp: Utc::now(),
            task_ids,
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// Subscriber interface for post-commit notifications
pub trait ChangeSink: Send {
    fn emit(&mut self, event: &ChangeEvent) -> Result<()>;
}

/// Sink that writes one JSON line per event
pub struct JsonlSink {
    writer: Box<dyn Write + Send>,
}

impl JsonlSink {
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Append events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl ChangeSink for JsonlSink {
    fn emit(&mut self, event: &ChangeEvent) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
