//! Error types for rcmd
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias using RcmdError
pub type Result<T> = std::result::Result<T, RcmdError>;

/// errno values surfaced in replies when no raw OS code is available
pub const EIO: i64 = 5;
pub const EACCES: i64 = 13;
pub const EINVAL: i64 = 22;

/// Unified error type for rcmd operations
#[derive(Debug, Error)]
pub enum RcmdError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    /// Connect failed, was rejected or timed out; fatal to that session only
    #[error("Transport error: {0}")]
    Transport(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: String,
        state: SessionState,
    },

    /// Session context token did not match the one set at connect/accept
    #[error("Integrity fault: {0}")]
    Integrity(String),

    // -------------------------------------------------------------------------
    // Execution Errors
    // -------------------------------------------------------------------------
    #[error("Path refused: {0}")]
    PathRefused(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RcmdError {
    /// Build an `InvalidState` error for `operation` attempted in `state`
    pub fn invalid_state(operation: impl Into<String>, state: SessionState) -> Self {
        RcmdError::InvalidState {
            operation: operation.into(),
            state,
        }
    }

    /// Negative OS error code to carry in a reply status
    pub fn os_code(&self) -> i64 {
        match self {
            RcmdError::Io(e) => -e.raw_os_error().map(i64::from).unwrap_or(EIO),
            RcmdError::PathRefused(_) => -EACCES,
            RcmdError::Malformed(_) | RcmdError::Config(_) => -EINVAL,
            _ => -EIO,
        }
    }

    /// True for errors that must close the session they occurred on
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            RcmdError::Malformed(_) | RcmdError::Integrity(_) | RcmdError::Transport(_)
        )
    }
}
