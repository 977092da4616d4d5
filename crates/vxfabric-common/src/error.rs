//! Error types for fabric control-plane operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Port-control
//! failures are ordinary values scoped to one device; an absent port is
//! never an error and is represented as `Ok(None)` by the callers that
//! query for it.

use std::io;
use thiserror::Error;

/// Result type alias for fabric operations.
pub type FabricResult<T> = Result<T, FabricError>;

/// Errors that can occur while driving switch control channels.
#[derive(Debug, Error)]
pub enum FabricError {
    /// Control channel to a device could not be established.
    #[error("Control channel to {address} unreachable: {message}")]
    Connection {
        /// The OVSDB remote (e.g., "tcp:10.0.0.2:6640").
        address: String,
        /// Error message.
        message: String,
    },

    /// Failed to spawn a control command.
    #[error("Failed to execute control command '{command}': {source}")]
    CommandExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Control command returned non-zero exit code.
    #[error("Control command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Control command did not complete within the configured bound.
    #[error("Control command timed out after {secs}s: '{command}'")]
    Timeout {
        /// The command that timed out.
        command: String,
        /// The timeout bound in seconds.
        secs: u64,
    },

    /// The device accepted the channel but returned an unusable response.
    #[error("Protocol error from {address}: {message}")]
    Protocol {
        /// The OVSDB remote.
        address: String,
        /// Error message.
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl FabricError {
    /// Creates a connection error.
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed when reconciliation is re-attempted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FabricError::Connection { .. }
                | FabricError::CommandFailed { .. }
                | FabricError::Timeout { .. }
                | FabricError::Protocol { .. }
        )
    }
}
