//! Chunked remote client.
//!
//! Wraps an [`RpcConnection`] with the two call shapes test clients use:
//! - [`RemoteClient::content_call`]: one call, response returned verbatim
//! - [`RemoteClient::file_call`]: a download streamed in chunks into a
//!   local file
//!
//! # Chunk Protocol
//!
//! `file_call` appends an offset and a maximum chunk size to the caller's
//! parameters. The code of each reply doubles as the next offset: zero is
//! done, a positive value means "call again from here", a negative value is
//! an error.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()` or `.expect()` calls
//! - Parameter slots are addressed with `get_mut` and checked lengths

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use rta_core::{ChunkStatus, ErrorCode, Parameter, Response, MAX_CHUNK_SIZE};
use rta_protocol::endpoints;

use crate::config::{ClientConfig, DEFAULT_CALL_TIMEOUT};
use crate::connection::{ConnectionState, RpcConnection};

/// Payload returned when the download destination cannot be opened.
pub const CANT_CREATE_FILE: &str = "Can't create file";

/// Client-side view of the server, built on one shared connection.
pub struct RemoteClient {
    connection: Arc<dyn RpcConnection>,
    download_dir: PathBuf,
}

impl RemoteClient {
    /// Wraps `connection` and announces this client to the server.
    pub async fn new(connection: Arc<dyn RpcConnection>) -> Self {
        Self::with_download_dir(connection, ClientConfig::default().download_dir).await
    }

    /// Like [`RemoteClient::new`], downloading chunked files into `download_dir`.
    pub async fn with_download_dir(
        connection: Arc<dyn RpcConnection>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        connection.set_timeout(DEFAULT_CALL_TIMEOUT);

        let ack = connection.call(endpoints::CLIENT_CONNECTED, Vec::new()).await;
        if ack.is_success() {
            info!("Client registered with server");
        } else {
            warn!(code = ack.code, payload = %ack.payload, "client_connected was not acknowledged");
        }

        Self {
            connection,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Live state of the underlying connection.
    pub fn connected(&self) -> bool {
        self.connection.connection_state() == ConnectionState::Connected
    }

    /// Performs exactly one call, unless the connection is already down.
    pub async fn content_call(&self, name: &str, params: Vec<Parameter>) -> Response {
        if !self.connected() {
            debug!(method = name, "Skipping call, not connected");
            return Response::status(ErrorCode::NoConnection);
        }
        self.connection.call(name, params).await
    }

    /// Downloads a file in chunks.
    ///
    /// The final component of the second caller parameter names the local
    /// copy inside the download directory. Returns the local path with `SUCCESS`, or the failure code.
    pub async fn file_call(&self, name: &str, params: Vec<Parameter>) -> Response {
        if !self.connected() {
            debug!(method = name, "Skipping chunked call, not connected");
            return Response::status(ErrorCode::NoConnection);
        }

        let caller_params = params.len();
        let mut params = params;
        params.push(Parameter::int(0));
        params.push(Parameter::int(MAX_CHUNK_SIZE));

        let mut response = self.connection.call(name, params.clone()).await;
        if response.chunk_status().is_error() {
            return response;
        }

        let Some(file_name) = params.get(1).filter(|_| caller_params >= 2) else {
            warn!(method = name, caller_params, "Chunked call needs a file name parameter");
            return Response::status(ErrorCode::Failed);
        };
        // Only the final component: the server's name must not steer the write
        let Some(base_name) = Path::new(&file_name.value).file_name() else {
            warn!(method = name, file = %file_name.value, "Chunked call file name has no final component");
            return Response::status(ErrorCode::Failed);
        };
        let destination = self.download_dir.join(base_name);

        let mut file = match File::create(&destination).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "Failed to create download file");
                return Response::failed(CANT_CREATE_FILE);
            }
        };

        loop {
            let next_offset = match response.chunk_status() {
                ChunkStatus::Error(code) => {
                    warn!(method = name, code, "Chunked call failed mid-transfer");
                    drop(file);
                    discard(&destination).await;
                    return Response::failed("");
                }
                ChunkStatus::Done => None,
                ChunkStatus::MoreAt(offset) => Some(offset),
            };

            if let Err(e) = file.write_all(response.payload.as_bytes()).await {
                warn!(path = %destination.display(), error = %e, "Failed to write chunk");
                drop(file);
                discard(&destination).await;
                return Response::failed("");
            }

            let Some(offset) = next_offset else {
                break;
            };

            debug!(method = name, offset, "Requesting next chunk");
            if let Some(slot) = params.get_mut(caller_params) {
                *slot = Parameter::int(ChunkStatus::MoreAt(offset).to_code());
            }
            response = self.connection.call(name, params.clone()).await;
        }

        if let Err(e) = file.flush().await {
            warn!(path = %destination.display(), error = %e, "Failed to flush download file");
            drop(file);
            discard(&destination).await;
            return Response::failed("");
        }

        Response::success(destination.display().to_string())
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}
