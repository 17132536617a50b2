//! Error taxonomy shared by client and server, plus domain errors.
//!
//! Every RPC reply carries one of the [`ErrorCode`] values. The numeric
//! encoding is stable across client and server and must never change.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Codes
// ============================================================================

/// Status codes carried in the `code` field of every RPC response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ErrorCode {
    Success,
    Failed,
    ReadFailure,
    WriteFailure,
    PathNotFound,
    CloseFailure,
    OpenFailure,
    NoConnection,
    ExceptionThrown,
    TimeoutExpired,
    AlreadyExists,
}

impl ErrorCode {
    /// All codes, in wire order from 0 downwards.
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::Success,
        ErrorCode::Failed,
        ErrorCode::ReadFailure,
        ErrorCode::WriteFailure,
        ErrorCode::PathNotFound,
        ErrorCode::CloseFailure,
        ErrorCode::OpenFailure,
        ErrorCode::NoConnection,
        ErrorCode::ExceptionThrown,
        ErrorCode::TimeoutExpired,
        ErrorCode::AlreadyExists,
    ];

    /// Returns the wire value.
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Failed => -1,
            ErrorCode::ReadFailure => -2,
            ErrorCode::WriteFailure => -3,
            ErrorCode::PathNotFound => -4,
            ErrorCode::CloseFailure => -5,
            ErrorCode::OpenFailure => -6,
            ErrorCode::NoConnection => -7,
            ErrorCode::ExceptionThrown => -8,
            ErrorCode::TimeoutExpired => -9,
            ErrorCode::AlreadyExists => -10,
        }
    }

    /// Maps a wire value back to a code, if it is one of the defined values.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Returns the constant-style name (`NO_CONNECTION`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::Failed => "FAILED",
            ErrorCode::ReadFailure => "READ_FAILURE",
            ErrorCode::WriteFailure => "WRITE_FAILURE",
            ErrorCode::PathNotFound => "PATH_NOT_FOUND",
            ErrorCode::CloseFailure => "CLOSE_FAILURE",
            ErrorCode::OpenFailure => "OPEN_FAILURE",
            ErrorCode::NoConnection => "NO_CONNECTION",
            ErrorCode::ExceptionThrown => "EXCEPTION_THROWN",
            ErrorCode::TimeoutExpired => "TIMEOUT_EXPIRED",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
        }
    }

    /// Human-readable message attached to failed transport calls.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::Failed => "Failed",
            ErrorCode::ReadFailure => "Reading failure",
            ErrorCode::WriteFailure => "Writing failure",
            ErrorCode::PathNotFound => "Connection not found",
            ErrorCode::CloseFailure => "Closing failure",
            ErrorCode::OpenFailure => "Opening failure",
            ErrorCode::NoConnection => "No connection",
            ErrorCode::ExceptionThrown => "Exception thrown",
            ErrorCode::TimeoutExpired => "Timeout expired",
            ErrorCode::AlreadyExists => "Channel already exists",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i64> for ErrorCode {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ErrorCode::from_code(value).ok_or(DomainError::UnknownErrorCode { code: value })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formats any wire code, naming it when it is a defined error code.
pub fn describe_code(code: i64) -> String {
    match ErrorCode::from_code(code) {
        Some(known) => format!("{code} ({known})"),
        None => code.to_string(),
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Address string is not a literal IP address
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Port number outside of 0..=65535
    #[error("Invalid port {value}")]
    InvalidPort { value: i64 },

    /// Numeric code outside the error taxonomy
    #[error("Unknown error code {code}")]
    UnknownErrorCode { code: i64 },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
