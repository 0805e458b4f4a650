//! Error types for the lifecycle supervisor.

use std::path::PathBuf;

/// All errors that can occur while gating or executing a lifecycle request.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Identity Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unknown agent identity: {0}")]
    UnresolvedIdentity(String),

    // ─────────────────────────────────────────────────────────────────────
    // Precondition Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Agent state file not found: {path} (expected {key}=true)")]
    StateFileMissing { path: PathBuf, key: String },

    #[error("Agent state unreadable: {path}: {source}")]
    StateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent state malformed: {path}: {details}")]
    StateMalformed { path: PathBuf, details: String },

    #[error("Agent state missing {key} field: {path}")]
    RequestFlagMissing { path: PathBuf, key: String },

    #[error("Agent state {key} is not true (got: {value})")]
    RequestFlagNotTrue { key: String, value: String },

    // ─────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Status record not found: {0}")]
    StatusRecordNotFound(String),

    #[error("Status record {id} is not an agent record (type={kind})")]
    NotAgentRecord { id: String, kind: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WardenError {
    /// True for failures of the readiness gate, as opposed to execution faults.
    #[cfg(test)]
    pub(crate) fn is_precondition(&self) -> bool {
        matches!(
            self,
            WardenError::StateFileMissing { .. }
                | WardenError::StateUnreadable { .. }
                | WardenError::StateMalformed { .. }
                | WardenError::RequestFlagMissing { .. }
                | WardenError::RequestFlagNotTrue { .. }
        )
    }
}

/// Convenience type alias for Results using WardenError.
pub type Result<T> = std::result::Result<T, WardenError>;
