//! One live WebSocket connection to an endpoint.
//!
//! The socket is owned by a single actor task. Writes, close and the read
//! loop all run on that task, so they never race on socket state. Callers
//! hold a cheap [`WebsocketSession`] that talks to the actor over a channel.
//!
//! Inbound messages are pushed onto the session's own queue, guarded by a
//! lock independent of the broker's maps, and drained FIFO by
//! [`WebsocketSession::get_message`].
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned queue lock is recovered, socket errors end the session

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rta_core::EndpointIdentity;

/// Maximum time a single write may take.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the command channel to the actor.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Queue of fully received inbound messages.
pub type InboundQueue = Arc<Mutex<VecDeque<String>>>;

fn lock_queue(queue: &Mutex<VecDeque<String>>) -> MutexGuard<'_, VecDeque<String>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Commands
// ============================================================================

enum SessionCommand {
    Write {
        data: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

// ============================================================================
// Session Handle
// ============================================================================

/// Handle to a session actor.
#[derive(Debug)]
pub struct WebsocketSession {
    endpoint: EndpointIdentity,
    commands: mpsc::Sender<SessionCommand>,
    inbound: InboundQueue,
    open: Arc<AtomicBool>,
}

impl WebsocketSession {
    /// Starts the actor on an already handshaken WebSocket.
    ///
    /// The actor runs until `cancel` fires, [`close`](Self::close) is called,
    /// or the peer goes away. The returned handle completes when it exits.
    pub fn spawn<S>(
        ws: WebSocketStream<S>,
        endpoint: EndpointIdentity,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let inbound: InboundQueue = Arc::new(Mutex::new(VecDeque::new()));
        let open = Arc::new(AtomicBool::new(true));

        let actor = SessionActor {
            endpoint,
            inbound: Arc::clone(&inbound),
            open: Arc::clone(&open),
        };
        let handle = tokio::spawn(actor.run(ws, rx, cancel));

        let session = Self {
            endpoint,
            commands: tx,
            inbound,
            open,
        };
        (session, handle)
    }

    pub fn endpoint(&self) -> EndpointIdentity {
        self.endpoint
    }

    /// True between a completed handshake and the end of the read loop.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Writes one text message, waiting for the actor to flush it.
    pub async fn write(&self, data: &str) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }

        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Write {
                data: data.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| SessionError::Closed)?;

        match timeout(WRITE_TIMEOUT, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }

    /// Pops the oldest inbound message, if any.
    pub fn get_message(&self) -> Option<String> {
        lock_queue(&self.inbound).pop_front()
    }

    /// Number of inbound messages waiting.
    pub fn pending(&self) -> usize {
        lock_queue(&self.inbound).len()
    }

    /// Asks the actor to send a close frame and stop. Safe to call twice.
    pub async fn close(&self) {
        let (respond_to, done) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Close { respond_to })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

struct SessionActor {
    endpoint: EndpointIdentity,
    inbound: InboundQueue,
    open: Arc<AtomicBool>,
}

impl SessionActor {
    async fn run<S>(
        self,
        ws: WebSocketStream<S>,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        info!(endpoint = %self.endpoint, "WebSocket session open");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(endpoint = %self.endpoint, "Session cancelled");
                    self.open.store(false, Ordering::Release);
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }

                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Write { data, respond_to }) => {
                            let result = sink
                                .send(Message::Text(data.into()))
                                .await
                                .map_err(|e| SessionError::Write(e.to_string()));
                            if let Err(ref e) = result {
                                warn!(endpoint = %self.endpoint, error = %e, "WebSocket write failed");
                            }
                            let _ = respond_to.send(result);
                        }
                        Some(SessionCommand::Close { respond_to }) => {
                            self.open.store(false, Ordering::Release);
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = sink.close().await;
                            let _ = respond_to.send(());
                            break;
                        }
                        None => {
                            // Every handle dropped
                            self.open.store(false, Ordering::Release);
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.push(text.as_str().to_string());
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.push(String::from_utf8_lossy(&data).into_owned());
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(endpoint = %self.endpoint, "Peer closed WebSocket session");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong frames are answered by tungstenite
                        }
                        Some(Err(e)) => {
                            warn!(endpoint = %self.endpoint, error = %e, "WebSocket read failed");
                            break;
                        }
                    }
                }
            }
        }

        self.open.store(false, Ordering::Release);
        debug!(endpoint = %self.endpoint, "Session actor stopped");
    }

    fn push(&self, message: String) {
        let mut queue = lock_queue(&self.inbound);
        queue.push_back(message);
        debug!(endpoint = %self.endpoint, queued = queue.len(), "Inbound message queued");
    }
}

/// Errors from session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Write timed out")]
    WriteTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, client_async};

    /// Connects a client session to an in-process echo peer.
    async fn echo_pair() -> (WebsocketSession, JoinHandle<()>, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() || msg.is_binary() {
                    if ws.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        });

        let endpoint = EndpointIdentity::from(addr);
        let stream = TcpStream::connect(addr).await.unwrap();
        let (ws, _) = client_async(endpoint.ws_url(), stream).await.unwrap();
        let cancel = CancellationToken::new();
        let (session, handle) = WebsocketSession::spawn(ws, endpoint, cancel.clone());
        (session, handle, cancel)
    }

    async fn wait_for_message(session: &WebsocketSession) -> Option<String> {
        for _ in 0..100 {
            if let Some(msg) = session.get_message() {
                return Some(msg);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_write_and_echo_in_order() {
        let (session, _handle, cancel) = echo_pair().await;
        assert!(session.is_open());

        session.write("one").await.unwrap();
        session.write("two").await.unwrap();

        assert_eq!(wait_for_message(&session).await.as_deref(), Some("one"));
        assert_eq!(wait_for_message(&session).await.as_deref(), Some("two"));
        assert!(session.get_message().is_none());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancel_stops_actor() {
        let (session, handle, cancel) = echo_pair().await;

        cancel.cancel();
        cancel.cancel();
        handle.await.unwrap();

        assert!(!session.is_open());
        assert_eq!(session.write("late").await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, handle, _cancel) = echo_pair().await;

        session.close().await;
        session.close().await;
        handle.await.unwrap();
        assert!(!session.is_open());
    }
}
