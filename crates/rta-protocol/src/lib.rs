//! RTA Protocol - Wire protocol for RPC calls
//!
//! Requests and replies travel as newline-delimited JSON over TCP. This
//! crate defines the frames, the endpoint names and protocol versioning;
//! the parameter and response shapes come from `rta-core`.

pub mod endpoints;
pub mod message;
pub mod version;

pub use message::{RpcReply, RpcRequest};
pub use version::{ProtocolVersion, VersionError};

/// Maximum size of one frame on the wire (8 MiB).
///
/// A full chunk of file content must fit after JSON escaping.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1_048_576;
