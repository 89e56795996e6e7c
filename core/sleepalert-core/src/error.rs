//! Error types for sleepalert-core operations.

use std::path::PathBuf;

/// Broad failure class, used by the monitor to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Skip the current tick and retry on the next one.
    Transient,
    /// Brightness or battery access is not available; keep monitoring without effect.
    Unavailable,
    /// State-machine corruption. The daemon stops and lets the supervisor restart it.
    Invariant,
}

/// All errors that can occur while reading power state or driving the display.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    // ─────────────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command timed out after {timeout_ms}ms: {command}")]
    CommandTimedOut { command: String, timeout_ms: u64 },

    #[error("Unrecognized {what} output: {raw}")]
    Parse { what: &'static str, raw: String },

    #[error("Permission denied: {resource}")]
    PermissionDenied { resource: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // State Machine
    // ─────────────────────────────────────────────────────────────────────
    #[error("Monitor invariant violated: {0}")]
    Invariant(String),
}

impl MonitorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MonitorError::PermissionDenied { .. }
            | MonitorError::BackendUnavailable(_)
            | MonitorError::ConfigMalformed { .. } => ErrorClass::Unavailable,
            MonitorError::Invariant(_) => ErrorClass::Invariant,
            MonitorError::CommandFailed { .. }
            | MonitorError::CommandTimedOut { .. }
            | MonitorError::Parse { .. }
            | MonitorError::Io { .. } => ErrorClass::Transient,
        }
    }

    /// Maps an I/O error on `resource`, promoting EACCES/EPERM to `PermissionDenied`.
    pub fn from_io(resource: impl Into<String>, source: std::io::Error) -> Self {
        let resource = resource.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            MonitorError::PermissionDenied { resource }
        } else {
            MonitorError::Io {
                context: resource,
                source,
            }
        }
    }

    /// Short stable key for rate-limited logging.
    pub fn throttle_key(&self) -> &'static str {
        match self {
            MonitorError::CommandFailed { .. } => "command_failed",
            MonitorError::CommandTimedOut { .. } => "command_timed_out",
            MonitorError::Parse { .. } => "parse",
            MonitorError::PermissionDenied { .. } => "permission_denied",
            MonitorError::BackendUnavailable(_) => "backend_unavailable",
            MonitorError::Io { .. } => "io",
            MonitorError::ConfigMalformed { .. } => "config",
            MonitorError::Invariant(_) => "invariant",
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
