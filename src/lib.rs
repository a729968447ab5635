//! tjm - Todo JSON Manager
//!
//! A transactional, single-writer, file-backed task store. The on-disk JSON
//! document is always a complete, consistent snapshot; every mutation is
//! reversible through a bounded undo history; user-supplied ids are resolved
//! tolerantly; and search ranks hits across title, description, and tags.
//!
//! The engine has no transport: the surrounding tool layer hands it
//! validated command payloads and relays results/events. It never calls out
//! to the network.
//!
//! # Core Concepts
//!
//! - **DurableStore**: exclusive owner of the data file, atomic writes,
//!   immediate vs batched persistence
//! - **TaskRepository**: in-memory index, single-task operations, undo
//! - **DependencyGraph**: cycle detection and dependent lookup
//! - **BulkCoordinator**: all-or-nothing multi-task operations
//! - **Change events**: post-commit hook for mirrors and integrations
//!
//! # Module Organization
//!
//! - `bulk`: atomic multi-task update/delete with dry-run reports
//! - `config`: configuration loading from `todo.toml`
//! - `error`: error types, codes, and result aliases
//! - `events`: post-commit change events and sinks
//! - `graph`: dependency-graph queries
//! - `history`: operation records and the undo stack
//! - `lock`: file locking and atomic write primitives
//! - `repository`: the task index and single-task operations
//! - `resolve`: tolerant task-id resolution
//! - `search`: ranked multi-field search
//! - `store`: the durable JSON data file
//! - `task`: task records, patches, filters

pub mod bulk;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod history;
pub mod lock;
pub mod repository;
pub mod resolve;
pub mod search;
pub mod store;
pub mod task;

pub use error::{Error, Result};
