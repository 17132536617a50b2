//! RTA Core - Shared types for the remote test adapter
//!
//! This crate provides the domain types shared between the server (rtad)
//! and the client library (rta-client): the error taxonomy, endpoint
//! identities, RPC parameters and responses.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod endpoint;
pub mod error;
pub mod param;
pub mod response;

// Re-exports for convenience
pub use endpoint::EndpointIdentity;
pub use error::{describe_code, DomainError, DomainResult, ErrorCode};
pub use param::{ParamError, ParamKind, Parameter, BAD_VALUE_TYPE, INCORRECT_PARAM_COUNT};
pub use response::{AppStatus, ChunkStatus, Response};

/// Upper bound on a single file-content chunk (1 MiB).
pub const MAX_CHUNK_SIZE: i64 = 1_048_576;

/// Suffix appended to a file name when it is backed up.
pub const BACKUP_SUFFIX: &str = "_origin";

/// Default TCP port of the RPC server.
pub const DEFAULT_PORT: u16 = 5555;

/// Default directory for files downloaded by chunked calls.
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/";
