//! Error types for tw
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown item or project, wrong status)
//! - 3: Blocked by dependency policy (incomplete blockers, cycle, dependents)
//! - 4: Operation failed (I/O, serialization, validation issues)
//!
//! Item IDs inside errors are already rendered at their project's width.

use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

use crate::model::Status;

/// Exit codes for tw CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const DEPENDENCY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for tw operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0}")]
    ProjectExists(String),

    #[error("Invalid item id: {0}")]
    InvalidId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{id} is not open (status: {status})")]
    NotOpen { id: String, status: Status },

    #[error("{0} is already open")]
    AlreadyOpen(String),

    #[error("{id} is already deferred by {wait}")]
    AlreadyDeferred { id: String, wait: String },

    #[error("{id} is dormant; unresolved blockers: {}", .blockers.join(", "))]
    WaitDormant { id: String, blockers: Vec<String> },

    // Dependency policy (exit code 3)
    #[error("{id} has incomplete blockers: {}", .blockers.join(", "))]
    IncompleteBlockers { id: String, blockers: Vec<String> },

    #[error("Dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{id} has open dependents: {}", .dependents.join(", "))]
    Dependents { id: String, dependents: Vec<String> },

    // Operation failures (exit code 4)
    #[error("Validation found {count} issue(s)")]
    ValidationFailed { count: usize, issues: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::NotFound(_)
            | Error::ProjectNotFound(_)
            | Error::ProjectExists(_)
            | Error::InvalidId(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::NotOpen { .. }
            | Error::AlreadyOpen(_)
            | Error::AlreadyDeferred { .. }
            | Error::WaitDormant { .. } => exit_codes::USER_ERROR,

            // Dependency policy
            Error::IncompleteBlockers { .. } | Error::Cycle { .. } | Error::Dependents { .. } => {
                exit_codes::DEPENDENCY_BLOCKED
            }

            // Operation failures
            Error::ValidationFailed { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Yaml { .. }
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured payload for the JSON error envelope
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotOpen { id, status } => Some(json!({
                "id": id,
                "status": status,
            })),
            Error::AlreadyDeferred { id, wait } => Some(json!({
                "id": id,
                "wait": wait,
            })),
            Error::WaitDormant { id, blockers } => Some(json!({
                "id": id,
                "blockers": blockers,
            })),
            Error::IncompleteBlockers { id, blockers } => Some(json!({
                "id": id,
                "blockers": blockers,
            })),
            Error::Cycle { path } => Some(json!({ "path": path })),
            Error::Dependents { id, dependents } => Some(json!({
                "id": id,
                "dependents": dependents,
            })),
            Error::ValidationFailed { count, issues } => Some(json!({
                "count": count,
                "issues": issues,
            })),
            Error::Yaml { path, .. } => Some(json!({ "path": path })),
            _ => None,
        }
    }
}

/// Result type alias for tw operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
