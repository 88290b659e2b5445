//! Error types for route table operations.
//!
//! Absence of a route is not an error: lookups that can miss report it
//! through `bool` or `Option` return values instead.

use thiserror::Error;

/// Result type alias for route table operations.
pub type Result<T> = std::result::Result<T, RouteTableError>;

/// Errors returned by [`RouteTable`](crate::RouteTable) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTableError {
    /// The global pending-packet budget is exhausted.
    ///
    /// The packet was not staged and no reference to it was taken; the
    /// caller should handle it out of band (e.g. deliver it locally only).
    #[error("No buffer space for pending packet ({max_pending_packets} packets already buffered)")]
    NoBufferSpace {
        /// The configured budget that was hit.
        max_pending_packets: usize,
    },

    /// The operation is not valid in the table's current lifecycle state.
    #[error("Cannot {operation}: route table is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The lifecycle state the table was in.
        state: &'static str,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: &'static str,
        /// Error message.
        message: String,
    },
}

impl RouteTableError {
    /// Creates a no-buffer-space error.
    pub fn no_buffer_space(max_pending_packets: usize) -> Self {
        Self::NoBufferSpace {
            max_pending_packets,
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouteTableError::NoBufferSpace { .. })
    }
}
