//! Error types for tjm
//!
//! Error codes surfaced to the surrounding tool layer:
//! - `validation`: bad field value, enum, or pattern
//! - `not_found` / `ambiguous`: id resolution failures (carry suggestions)
//! - `conflict`: circular dependency or delete blocked by dependents
//! - `persistence`: I/O or serialization failure, prior state untouched
//! - `bulk_failed`: aggregated per-id validation failures
//! - `nothing_to_undo`: undo called on an empty history

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Stable error codes for tjm operations
pub mod codes {
    pub const VALIDATION: &str = "validation";
    pub const NOT_FOUND: &str = "not_found";
    pub const AMBIGUOUS: &str = "ambiguous";
    pub const CONFLICT: &str = "conflict";
    pub const PERSISTENCE: &str = "persistence";
    pub const BULK_FAILED: &str = "bulk_failed";
    pub const NOTHING_TO_UNDO: &str = "nothing_to_undo";
}

/// One failed target inside an aborted bulk operation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailure {
    /// The id as the caller supplied it
    pub input: String,
    /// Error code for this target
    pub code: String,
    /// Human-readable reason
    pub message: String,
}

/// Main error type for tjm operations
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors
    #[error("Invalid value: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Resolution errors
    #[error("Task not found: {input}")]
    NotFound {
        input: String,
        /// Closest known ids, best first
        suggestions: Vec<String>,
    },

    #[error("Ambiguous task id '{input}': matches {}", candidates.join(", "))]
    Ambiguous {
        input: String,
        candidates: Vec<String>,
    },

    // Conflicts
    #[error("Circular dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Cannot remove {id}: depended on by {}", dependents.join(", "))]
    DeleteBlocked {
        id: String,
        dependents: Vec<String>,
    },

    // Persistence failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    // Bulk aggregation
    #[error("Bulk operation aborted: {} target(s) failed validation", failures.len())]
    BulkFailed { failures: Vec<BulkFailure> },

    // Undo
    #[error("Nothing to undo")]
    NothingToUndo,
}

impl Error {
    /// Get the stable error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::InvalidConfig(_) => codes::VALIDATION,
            Error::NotFound { .. } => codes::NOT_FOUND,
            Error::Ambiguous { .. } => codes::AMBIGUOUS,
            Error::CircularDependency { .. } | Error::DeleteBlocked { .. } => codes::CONFLICT,
            Error::Io(_) | Error::Json(_) | Error::TomlParse(_) | Error::LockFailed(_) => {
                codes::PERSISTENCE
            }
            Error::BulkFailed { .. } => codes::BULK_FAILED,
            Error::NothingToUndo => codes::NOTHING_TO_UNDO,
        }
    }
}

/// Result type alias for tjm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for relaying errors to the tool layer in JSON form
#[derive(Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        let details = match err {
            Error::NotFound { suggestions, .. } if !suggestions.is_empty() => {
                Some(serde_json::json!({ "suggestions": suggestions }))
            }
            Error::Ambiguous { candidates, .. } => {
                Some(serde_json::json!({ "candidates": candidates }))
            }
            Error::CircularDependency { chain } => Some(serde_json::json!({ "chain": chain })),
            Error::DeleteBlocked { dependents, .. } => Some(serde_json::json!({
                "dependents": dependents,
                "options": ["block", "reassign", "cascade"],
            })),
            Error::BulkFailed { failures } => serde_json::to_value(failures)
                .ok()
                .map(|f| serde_json::json!({ "failures": f })),
            _ => None,
        };

        JsonError {
            error: err.to_string(),
            code: err.code(),
            details,
        }
    }
}
