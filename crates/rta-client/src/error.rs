//! Error types for the RTA client.
//!
//! Errors only exist below the [`RpcConnection`](crate::RpcConnection)
//! boundary. Callers of the connection always receive a `Response`; each
//! error is translated into one with [`ClientError::into_response`].
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::time::Duration;

use thiserror::Error;

use rta_core::{ErrorCode, Response};

// ============================================================================
// Client Error Type
// ============================================================================

/// Transport-level failures of an RPC call.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    ///
    /// Raised after the configured number of connection attempts has been
    /// used up. Check that `rtad` is running and listening on this address.
    #[error("Failed to connect to {address} after {attempts} attempts: {reason}")]
    Connect {
        address: String,
        attempts: u32,
        reason: String,
    },

    /// The connection was closed, by either side.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived within the call timeout.
    #[error("Call to {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    /// The server answered with an error reply instead of a result.
    #[error("Server error: {message}")]
    Remote { code: Option<i64>, message: String },

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode or decode error passthrough.
    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl ClientError {
    /// The taxonomy code this error maps onto.
    ///
    /// A timeout is `TIMEOUT_EXPIRED` and a closed connection is
    /// `NO_CONNECTION`. A server error carries its own code, or `FAILED`
    /// when it has none.
    pub fn code(&self) -> i64 {
        match self {
            ClientError::Timeout { .. } => ErrorCode::TimeoutExpired.code(),
            ClientError::ConnectionClosed => ErrorCode::NoConnection.code(),
            ClientError::Remote { code, .. } => code.unwrap_or(ErrorCode::Failed.code()),
            ClientError::Connect { .. } | ClientError::Io(_) | ClientError::ParseError(_) => {
                ErrorCode::Failed.code()
            }
        }
    }

    /// Collapses the error into a response carrying its message.
    pub fn into_response(self) -> Response {
        let code = self.code();
        Response::new(self.to_string(), code)
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_timeout_expired() {
        let error = ClientError::Timeout {
            method: "file_content".to_string(),
            timeout: Duration::from_millis(10_000),
        };
        assert_eq!(error.code(), -9);
        let response = error.into_response();
        assert!(response.payload.contains("file_content"));
        assert_eq!(response.code, -9);
    }

    #[test]
    fn test_remote_error_uses_embedded_code() {
        let error = ClientError::Remote {
            code: Some(-6),
            message: "open failed".to_string(),
        };
        assert_eq!(error.code(), -6);

        let error = ClientError::Remote {
            code: None,
            message: "method not found: x".to_string(),
        };
        assert_eq!(error.code(), ErrorCode::Failed.code());
    }

    #[test]
    fn test_closed_connection_maps_to_no_connection() {
        assert_eq!(
            ClientError::ConnectionClosed.code(),
            ErrorCode::NoConnection.code()
        );
    }

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            address: "127.0.0.1:5555".to_string(),
            attempts: 3,
            reason: "refused".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("127.0.0.1:5555"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let error: ClientError = io_error.into();
        assert!(matches!(error, ClientError::Io(_)));
        assert_eq!(error.code(), ErrorCode::Failed.code());
    }
}
