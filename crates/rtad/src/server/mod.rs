//! TCP server for RPC clients.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Shares one read-only endpoint table with every connection
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    RpcServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  EndpointTable  │
//! │   (per client)  │     │  (plugins)      │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ one task per call
//!         ▼
//! ┌─────────────────┐
//! │ Broker / Utils  │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{send_reply, ConnectionError, ConnectionHandler, ReplyWriter};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dispatch::EndpointTable;

/// RPC server.
///
/// Owns the listening socket; the endpoint table is shared with every
/// connection it accepts.
pub struct RpcServer {
    /// Bound listener
    listener: TcpListener,

    /// Endpoints bound by the plugins
    table: Arc<EndpointTable>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter, for logs
    connection_counter: AtomicU64,
}

impl RpcServer {
    /// Binds the listening socket.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so callers
    /// can read the actual port via [`local_addr`](Self::local_addr)
    /// before serving.
    pub async fn bind(
        address: SocketAddr,
        table: Arc<EndpointTable>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind {
                address,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            table,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr()?,
            endpoints = self.table.len(),
            "RPC server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let number = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            debug!(connection = number, peer = %peer, "Accepted connection");
                            self.handle_connection(stream, peer);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        info!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Server stopped"
        );
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            Arc::clone(&self.table),
            peer,
            self.cancel_token.child_token(),
        );
        tokio::spawn(handler.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {error}")]
    Bind { address: SocketAddr, error: String },

    #[error("Socket error: {0}")]
    Io(String),
}
