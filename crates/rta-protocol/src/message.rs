//! Protocol message types for RPC calls.
//!
//! Each request and reply is one JSON object on its own line. Replies carry
//! the `id` of the request they answer, so a connection can have many calls
//! in flight at once.

use crate::version::ProtocolVersion;
use rta_core::{Parameter, Response};
use serde::{Deserialize, Serialize};

/// A call sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Client-chosen correlation id, echoed in the reply
    pub id: u64,

    /// Endpoint name
    pub method: String,

    /// Positional arguments
    #[serde(default)]
    pub params: Vec<Parameter>,
}

impl RpcRequest {
    /// Creates a new request with the current protocol version.
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcReply {
    /// The handler ran and produced a response
    Result {
        /// Id of the request this answers
        id: u64,
        /// Handler output
        response: Response,
    },

    /// The call could not be dispatched
    Error {
        /// Id of the request this answers (0 if the request was unreadable)
        id: u64,
        /// Error code, when the failure maps onto the taxonomy
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i64>,
        /// Error message
        message: String,
    },
}

impl RpcReply {
    /// Creates a result reply.
    pub fn result(id: u64, response: Response) -> Self {
        Self::Result { id, response }
    }

    /// Creates an error reply.
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error reply with code.
    pub fn error_with_code(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Returns the correlation id.
    pub fn id(&self) -> u64 {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rta_core::ErrorCode;

    #[test]
    fn test_request_serialization() {
        let msg = RpcRequest::new(7, "app_stop", vec![Parameter::string("app")]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"method\":\"app_stop\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"kind\":\"string\""));
        assert!(json.contains("\"major\":1"));
    }

    #[test]
    fn test_request_without_params() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"id":1,"method":"client_connected"}"#;
        let parsed: RpcRequest = serde_json::from_str(json).unwrap();
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn test_reply_serialization() {
        let msg = RpcReply::result(3, Response::with_code("", ErrorCode::NoConnection));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"result\""));
        assert!(json.contains("\"code\":-7"));

        let err = RpcReply::error(4, "method not found: nope");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(!json.contains("\"code\""));
    }

    #[test]
    fn test_reply_id() {
        let parsed: RpcReply =
            serde_json::from_str(r#"{"type":"error","id":9,"code":-1,"message":"x"}"#).unwrap();
        assert_eq!(parsed.id(), 9);
        assert_eq!(parsed, RpcReply::error_with_code(9, -1, "x"));
    }
}
