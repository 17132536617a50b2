//! Raw RPC connection to the server.
//!
//! [`RpcConnection`] is the single-call primitive the chunked client is
//! layered on. [`TcpRpcConnection`] implements it over the JSON-lines
//! protocol:
//! - Connects with exponential backoff
//! - Tags every call with an id and routes replies back by id, so calls
//!   from many tasks can share one socket
//! - Translates transport errors into `Response` codes at this boundary
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use rta_core::{Parameter, Response};
use rta_protocol::{RpcReply, RpcRequest};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

// ============================================================================
// Connection Contract
// ============================================================================

/// Whether the underlying transport is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// A connection able to perform one RPC call at a time per caller.
///
/// Implementations never fail: every outcome, including transport errors
/// and timeouts, is reported as a `Response` code.
#[async_trait]
pub trait RpcConnection: Send + Sync {
    /// Performs one call and waits for its reply.
    async fn call(&self, method: &str, params: Vec<Parameter>) -> Response;

    /// Sets the timeout applied to subsequent calls.
    fn set_timeout(&self, timeout: Duration);

    /// Reports the live state of the transport.
    fn connection_state(&self) -> ConnectionState;
}

// ============================================================================
// TCP Connection
// ============================================================================

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>>;

fn lock_pending(
    pending: &Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<RpcReply>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// RPC connection over one TCP socket.
pub struct TcpRpcConnection {
    address: String,
    writer: tokio::sync::Mutex<BufWriter<OwnedWriteHalf>>,
    pending: PendingCalls,
    connected: Arc<AtomicBool>,
    next_id: AtomicU64,
    timeout_ms: AtomicU64,
    reader: JoinHandle<()>,
}

impl TcpRpcConnection {
    /// Connects to the server named by `config`, retrying with backoff.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = connect_with_retry(config).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_replies(
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        info!(address = %config.address(), "Connected to server");

        Ok(Self {
            address: config.address(),
            writer: tokio::sync::Mutex::new(BufWriter::new(writer)),
            pending,
            connected,
            next_id: AtomicU64::new(1),
            timeout_ms: AtomicU64::new(duration_ms(config.call_timeout)),
            reader,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Performs one call, surfacing transport failures as errors.
    pub async fn try_call(&self, method: &str, params: Vec<Parameter>) -> Result<Response> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ClientError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&RpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);

        // The reader may have drained the table between the check and the insert
        if !self.connected.load(Ordering::Acquire) {
            lock_pending(&self.pending).remove(&id);
            return Err(ClientError::ConnectionClosed);
        }

        if let Err(e) = self.write_line(&json).await {
            lock_pending(&self.pending).remove(&id);
            return Err(e);
        }

        let limit = self.timeout();
        match timeout(limit, rx).await {
            Ok(Ok(RpcReply::Result { response, .. })) => Ok(response),
            Ok(Ok(RpcReply::Error { code, message, .. })) => {
                Err(ClientError::Remote { code, message })
            }
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                lock_pending(&self.pending).remove(&id);
                Err(ClientError::Timeout {
                    method: method.to_string(),
                    timeout: limit,
                })
            }
        }
    }

    async fn write_line(&self, json: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RpcConnection for TcpRpcConnection {
    async fn call(&self, method: &str, params: Vec<Parameter>) -> Response {
        match self.try_call(method, params).await {
            Ok(response) => response,
            Err(e) => {
                debug!(method, error = %e, "Call failed");
                e.into_response()
            }
        }
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(duration_ms(timeout), Ordering::Relaxed);
    }

    fn connection_state(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

impl Drop for TcpRpcConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Attempts to connect with exponential backoff.
///
/// Uses exponential backoff between attempts, starting at `retry_initial_delay`
/// and capping at `retry_max_delay`, for at most `max_connect_attempts`.
async fn connect_with_retry(config: &ClientConfig) -> Result<TcpStream> {
    let address = config.address();
    let attempts = config.max_connect_attempts.max(1);
    let mut delay = config.retry_initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        debug!(attempt, address = %address, "Attempting to connect to server");

        match TcpStream::connect(address.as_str()).await {
            Ok(stream) => {
                debug!(attempt, "Connection successful");
                return Ok(stream);
            }
            Err(e) if attempt >= attempts => {
                return Err(ClientError::Connect {
                    address,
                    attempts,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                if attempt == 1 {
                    warn!(address = %address, error = %e, "Server not reachable, will retry");
                } else {
                    debug!(attempt, error = %e, "Connection attempt failed");
                }
            }
        }

        sleep(delay).await;
        let next_delay_ms = (delay.as_millis() as f64 * config.retry_multiplier) as u64;
        delay = Duration::from_millis(next_delay_ms).min(config.retry_max_delay);
    }
}

/// Routes replies to their waiting calls until the server closes.
///
/// On exit every pending call is released with a closed channel, which
/// its caller reports as `NO_CONNECTION`.
async fn read_replies(
    mut reader: BufReader<OwnedReadHalf>,
    pending: PendingCalls,
    connected: Arc<AtomicBool>,
) {
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Server closed connection");
                break;
            }
            Ok(_) => {
                let reply: RpcReply = match serde_json::from_str(line.trim()) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse reply");
                        continue;
                    }
                };
                let waiter = lock_pending(&pending).remove(&reply.id());
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!(id = reply.id(), "Reply for unknown or expired call"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Connection read failed");
                break;
            }
        }
    }

    connected.store(false, Ordering::Release);
    lock_pending(&pending).clear();
}
