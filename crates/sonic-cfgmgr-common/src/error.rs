//! Error types for cfgmgr operations.
//!
//! This module defines the error types used throughout the cfgmgr crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for cfgmgr operations.
pub type CfgMgrResult<T> = Result<T, CfgMgrError>;

/// Errors that can occur during cfgmgr operations.
#[derive(Debug, Error)]
pub enum CfgMgrError {
    /// Failed to read an init/seed file.
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        /// The file path.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Redis/database operation failed.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g., "get", "set", "subscribe").
        operation: String,
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

    /// Port/interface not found or not ready.
    #[error("Port '{port}' not found or not ready")]
    PortNotReady {
        /// The port alias.
        port: String,
    },

    /// Table entry not found.
    #[error("Table entry not found: {table}:{key}")]
    EntryNotFound {
        /// The table name.
        table: String,
        /// The key.
        key: String,
    },

    /// Init/seed data is self-contradictory; the dependent feature must be
    /// disabled for this load rather than aborting the process.
    #[error("Consistency check failed: {message}")]
    Consistency {
        /// Error message.
        message: String,
    },

    /// Warm restart operation failed.
    #[error("Warm restart failed: {message}")]
    WarmRestart {
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

impl CfgMgrError {
    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
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

    /// Creates a port not ready error.
    pub fn port_not_ready(port: impl Into<String>) -> Self {
        Self::PortNotReady { port: port.into() }
    }

    /// Creates an entry not found error.
    pub fn entry_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::EntryNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a consistency-check error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
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
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CfgMgrError::PortNotReady { .. } | CfgMgrError::Database { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CfgMgrError::port_not_ready("Ethernet0");
        assert_eq!(err.to_string(), "Port 'Ethernet0' not found or not ready");
    }

    #[test]
    fn test_database_error() {
        let err = CfgMgrError::database("hget", "Connection refused");
        assert_eq!(
            err.to_string(),
            "Database operation failed: hget: Connection refused"
        );
    }

    #[test]
    fn test_consistency_error() {
        let err = CfgMgrError::consistency("pool has no zero profile");
        assert!(err.to_string().contains("pool has no zero profile"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(CfgMgrError::port_not_ready("Ethernet0").is_retryable());
        assert!(CfgMgrError::database("get", "timeout").is_retryable());
        assert!(!CfgMgrError::internal("bug").is_retryable());
    }
}
