//! Connection handler for individual RPC clients.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Reads newline-delimited JSON requests
//! - Checks the protocol version of every request
//! - Dispatches each call on its own task so slow handlers never block
//!   the connection
//! - Writes replies through a shared writer, correlated by request id
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A panicking handler is reported to the caller as `EXCEPTION_THROWN`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rta_core::ErrorCode;
use rta_protocol::{ProtocolVersion, RpcReply, RpcRequest, MAX_MESSAGE_SIZE};

use crate::dispatch::EndpointTable;

/// Shared handle to the write half of a connection.
pub type ReplyWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Buffered reader for incoming requests
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer shared with in-flight calls
    writer: ReplyWriter,

    /// Endpoints bound by the plugins
    table: Arc<EndpointTable>,

    /// Remote address, for logs
    peer: SocketAddr,

    /// Stops the read loop on server shutdown
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        table: Arc<EndpointTable>,
        peer: SocketAddr,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            table,
            peer,
            cancel_token,
        }
    }

    /// Runs the read loop until the client disconnects or the server stops.
    ///
    /// Calls still in flight when the loop ends finish on their own tasks;
    /// their replies are dropped if the socket is already gone.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "Client connected");
        let cancel_token = self.cancel_token.clone();
        let peer = self.peer;

        loop {
            let line = tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!(peer = %peer, "Connection closed by server shutdown");
                    break;
                }
                result = self.read_line() => result,
            };

            match line {
                Ok(line) => self.handle_line(&line).await,
                Err(ConnectionError::Eof) => {
                    debug!(peer = %self.peer, "Client sent EOF");
                    break;
                }
                Err(e @ ConnectionError::InvalidUtf8(_)) => {
                    debug!(peer = %self.peer, error = %e, "Rejected request");
                    self.reply(RpcReply::error(0, e.to_string())).await;
                }
                Err(e @ ConnectionError::MessageTooLarge { .. }) => {
                    warn!(peer = %self.peer, error = %e, "Dropping client");
                    let _ = send_reply(&self.writer, &RpcReply::error(0, e.to_string())).await;
                    break;
                }
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "Connection closed");
                    break;
                }
            }
        }

        info!(peer = %self.peer, "Client disconnected");
    }

    /// Reads one request line, bounded by [`MAX_MESSAGE_SIZE`].
    ///
    /// A line that is not valid UTF-8 is consumed whole and reported as
    /// [`ConnectionError::InvalidUtf8`]; the stream stays usable.
    async fn read_line(&mut self) -> Result<String, ConnectionError> {
        let mut line = Vec::new();
        let limit = u64::try_from(MAX_MESSAGE_SIZE).unwrap_or(u64::MAX).saturating_add(1);

        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        String::from_utf8(line).map_err(|e| ConnectionError::InvalidUtf8(e.utf8_error().to_string()))
    }

    /// Validates one request and dispatches it.
    ///
    /// Protocol-level problems are answered inline; valid calls run on
    /// their own task.
    async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let request = match parse_request(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Rejected request");
                let reply = match &e {
                    ConnectionError::VersionMismatch { id, .. } => {
                        RpcReply::error_with_code(*id, ErrorCode::Failed.code(), e.to_string())
                    }
                    _ => RpcReply::error(0, e.to_string()),
                };
                self.reply(reply).await;
                return;
            }
        };

        let RpcRequest { id, method, params, .. } = request;
        let Some(call) = self.table.dispatch(&method, params) else {
            debug!(peer = %self.peer, id, method = %method, "Unknown method");
            self.reply(RpcReply::error(id, format!("method not found: {method}")))
                .await;
            return;
        };

        debug!(peer = %self.peer, id, method = %method, "Dispatching call");
        let writer = Arc::clone(&self.writer);
        let peer = self.peer;
        tokio::spawn(async move {
            let reply = match tokio::spawn(call).await {
                Ok(response) => RpcReply::result(id, response),
                Err(e) => {
                    error!(peer = %peer, id, method = %method, error = %e, "Handler failed");
                    RpcReply::error_with_code(id, ErrorCode::ExceptionThrown.code(), e.to_string())
                }
            };
            if let Err(e) = send_reply(&writer, &reply).await {
                debug!(peer = %peer, id, error = %e, "Failed to send reply");
            }
        });
    }

    async fn reply(&self, reply: RpcReply) {
        if let Err(e) = send_reply(&self.writer, &reply).await {
            debug!(peer = %self.peer, error = %e, "Failed to send reply");
        }
    }
}

/// Parses a request line and checks its protocol version.
fn parse_request(line: &str) -> Result<RpcRequest, ConnectionError> {
    let request: RpcRequest =
        serde_json::from_str(line).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    if !request
        .protocol_version
        .is_compatible_with(&ProtocolVersion::CURRENT)
    {
        return Err(ConnectionError::VersionMismatch {
            id: request.id,
            client: request.protocol_version,
            server: ProtocolVersion::CURRENT,
        });
    }

    Ok(request)
}

/// Writes one reply line.
pub async fn send_reply(writer: &ReplyWriter, reply: &RpcReply) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(reply).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let mut writer = writer.lock().await;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version {client} not compatible with server version {server}")]
    VersionMismatch {
        id: u64,
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Request is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            id: 1,
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 9_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("9000000"));
    }

    #[test]
    fn test_parse_request_checks_version() {
        let line = r#"{"protocol_version":{"major":2,"minor":0},"id":7,"method":"open","params":[]}"#;
        match parse_request(line) {
            Err(ConnectionError::VersionMismatch { id, client, .. }) => {
                assert_eq!(id, 7);
                assert_eq!(client, ProtocolVersion::new(2, 0));
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_request_accepts_newer_minor() {
        let line = r#"{"protocol_version":{"major":1,"minor":4},"id":3,"method":"receive"}"#;
        let request = parse_request(line).unwrap();
        assert_eq!(request.id, 3);
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        assert!(matches!(
            parse_request("not json"),
            Err(ConnectionError::ParseError(_))
        ));
    }
}
