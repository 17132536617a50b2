//! RPC responses and the status values decoded from their `code` field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// The (payload, code) pair returned by every RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub payload: String,
    pub code: i64,
}

impl Response {
    pub fn new(payload: impl Into<String>, code: i64) -> Self {
        Self {
            payload: payload.into(),
            code,
        }
    }

    pub fn success(payload: impl Into<String>) -> Self {
        Self::new(payload, ErrorCode::Success.code())
    }

    pub fn failed(payload: impl Into<String>) -> Self {
        Self::new(payload, ErrorCode::Failed.code())
    }

    pub fn with_code(payload: impl Into<String>, code: ErrorCode) -> Self {
        Self::new(payload, code.code())
    }

    /// A response with no payload and the given status.
    pub fn status(code: ErrorCode) -> Self {
        Self::with_code(String::new(), code)
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success.code()
    }

    /// The defined error code, if `code` is one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }

    pub fn chunk_status(&self) -> ChunkStatus {
        ChunkStatus::from_code(self.code)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:?}, {})",
            self.payload,
            crate::error::describe_code(self.code)
        )
    }
}

// ============================================================================
// Chunk Status
// ============================================================================

/// Outcome of one chunked file-content call.
///
/// On the wire this collapses to a single integer: zero is done, a positive
/// value is the offset to resume from, a negative value is an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The last chunk has been delivered.
    Done,
    /// More data remains; call again with this offset.
    MoreAt(u64),
    /// The call failed with this (negative) code.
    Error(i64),
}

impl ChunkStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ChunkStatus::Done,
            n if n > 0 => ChunkStatus::MoreAt(n.unsigned_abs()),
            n => ChunkStatus::Error(n),
        }
    }

    pub fn to_code(self) -> i64 {
        match self {
            ChunkStatus::Done => ErrorCode::Success.code(),
            ChunkStatus::MoreAt(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            ChunkStatus::Error(code) => code,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, ChunkStatus::Error(_))
    }
}

impl From<ErrorCode> for ChunkStatus {
    fn from(code: ErrorCode) -> Self {
        ChunkStatus::from_code(code.code())
    }
}

// ============================================================================
// Application Status
// ============================================================================

/// Liveness of a started application, as reported by `app_check_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Crashed,
    NotRunning,
    Running,
}

impl AppStatus {
    pub const fn code(self) -> i32 {
        match self {
            AppStatus::Crashed => -1,
            AppStatus::NotRunning => 0,
            AppStatus::Running => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(AppStatus::Crashed),
            0 => Some(AppStatus::NotRunning),
            1 => Some(AppStatus::Running),
            _ => None,
        }
    }

    /// Derives the status from matched processes and their summed thread count.
    pub fn from_threads(matched_processes: usize, total_threads: u64) -> Self {
        if matched_processes == 0 {
            AppStatus::NotRunning
        } else if total_threads > 1 {
            AppStatus::Running
        } else {
            AppStatus::Crashed
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
