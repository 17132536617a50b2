//! RTA client library.
//!
//! Talks to an `rtad` server over its JSON-lines RPC protocol.
//!
//! # Architecture
//!
//! The client is layered, each layer built on the one below:
//!
//! 1. **[`RpcConnection`]**: one call, one `Response`. [`TcpRpcConnection`]
//!    multiplexes concurrent calls over a single socket by request id.
//! 2. **[`RemoteClient`]**: `content_call` for single replies and
//!    `file_call` for chunked downloads.
//! 3. **[`TransportChannel`]** and **[`AdapterClient`]**: a polled broker
//!    endpoint and a typed method per server endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rta_client::{AdapterClient, ClientConfig, RemoteClient, TcpRpcConnection};
//!
//! # async fn run() -> rta_client::Result<()> {
//! let config = ClientConfig::default();
//! let connection = Arc::new(TcpRpcConnection::connect(&config).await?);
//! let client = Arc::new(RemoteClient::with_download_dir(connection, &config.download_dir).await);
//! let adapter = AdapterClient::new(client);
//!
//! let response = adapter.command_execute("uname -a").await;
//! println!("{}", response.payload);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod remote;

#[cfg(test)]
mod mock;

pub use adapter::AdapterClient;
pub use channel::{ChannelEvent, TransportChannel};
pub use config::ClientConfig;
pub use connection::{ConnectionState, RpcConnection, TcpRpcConnection};
pub use error::{ClientError, Result};
pub use remote::RemoteClient;
