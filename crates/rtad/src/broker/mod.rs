//! Transport broker.
//!
//! Maps (address, port) endpoints onto live WebSocket sessions. Callers may
//! send before the handshake completes; such messages go to the endpoint's
//! replay queue and are flushed, in order, once the session is open.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                MessageBroker                 │
//! │  contexts: EndpointIdentity → SessionContext │
//! │  replay:   EndpointIdentity → VecDeque       │
//! └──────────────┬───────────────────────────────┘
//!                │ one per open endpoint
//!                ▼
//! ┌─────────────────┐  spawns  ┌─────────────────┐
//! │ SessionListener │─────────▶│  SessionActor   │
//! │ (connect/retry) │          │ (owns socket)   │
//! └─────────────────┘          └─────────────────┘
//! ```
//!
//! Per endpoint: `CLOSED → OPENING → OPEN → CLOSED`. Opening an endpoint that
//! already has a context tears the old one down first.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Socket failures are logged and reported as status codes
//! - Poisoned locks are recovered rather than propagated

mod listener;
mod session;

pub use listener::{SessionListener, SessionSlot, RECONNECT_DELAY};
pub use session::{SessionError, WebsocketSession, WRITE_TIMEOUT};

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rta_core::{EndpointIdentity, ErrorCode, Parameter, Response};
use rta_protocol::endpoints;

use crate::dispatch::EndpointTable;
use crate::plugin::AdapterPlugin;

/// Default number of concurrency slots requested by `open`.
pub const DEFAULT_THREADS: usize = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Session Context
// ============================================================================

/// State owned per open endpoint.
struct SessionContext {
    cancel: CancellationToken,
    listener: JoinHandle<()>,
    session: SessionSlot,
    /// Serialises replay flushes and writes for this endpoint
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionContext {
    fn start(endpoint: EndpointIdentity, threads: usize) -> Self {
        let cancel = CancellationToken::new();
        let session: SessionSlot = Arc::new(OnceLock::new());
        let listener = SessionListener::new(endpoint, Arc::clone(&session));
        let listener = tokio::spawn(listener.run(cancel.clone()));

        debug!(
            endpoint = %endpoint,
            threads = threads.max(1),
            "Session context started"
        );

        Self {
            cancel,
            listener,
            session,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn handles(&self) -> (Option<Arc<WebsocketSession>>, Arc<tokio::sync::Mutex<()>>) {
        (self.session.get().cloned(), Arc::clone(&self.write_lock))
    }
}

// ============================================================================
// Broker
// ============================================================================

/// Owns every endpoint's session context and replay queue.
#[derive(Default)]
pub struct MessageBroker {
    contexts: Mutex<HashMap<EndpointIdentity, SessionContext>>,
    replay: Mutex<HashMap<EndpointIdentity, VecDeque<String>>>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or re-opens) a session to `endpoint`.
    ///
    /// Returns as soon as the listener is started; the handshake completes in
    /// the background.
    pub async fn open_connection(&self, endpoint: EndpointIdentity, threads: usize) -> ErrorCode {
        if self.is_registered(&endpoint) {
            debug!(endpoint = %endpoint, "Re-opening endpoint");
            self.close_connection(&endpoint).await;
        }

        let context = SessionContext::start(endpoint, threads);
        let mut contexts = lock(&self.contexts);
        match contexts.entry(endpoint) {
            Entry::Vacant(slot) => {
                slot.insert(context);
                info!(endpoint = %endpoint, "Endpoint opened");
                ErrorCode::Success
            }
            Entry::Occupied(_) => {
                // Lost a race with a concurrent open
                context.cancel.cancel();
                warn!(endpoint = %endpoint, "Endpoint already registered");
                ErrorCode::AlreadyExists
            }
        }
    }

    /// Closes the session to `endpoint` and forgets its replay queue.
    ///
    /// Waits until the listener and session tasks have exited.
    pub async fn close_connection(&self, endpoint: &EndpointIdentity) -> ErrorCode {
        let context = lock(&self.contexts).remove(endpoint);
        let Some(context) = context else {
            return ErrorCode::NoConnection;
        };

        context.cancel.cancel();
        let result = context.listener.await;
        lock(&self.replay).remove(endpoint);

        match result {
            Ok(()) => {
                info!(endpoint = %endpoint, "Endpoint closed");
                ErrorCode::Success
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Listener task failed");
                ErrorCode::CloseFailure
            }
        }
    }

    /// Sends `data` to the endpoint.
    ///
    /// On success the reply also carries the oldest pending inbound message.
    /// If the handshake has not completed yet the message is queued for
    /// replay and `WRITE_FAILURE` is returned. Once the session has ended
    /// the endpoint reports `NO_CONNECTION` until it is reopened.
    pub async fn send(&self, endpoint: &EndpointIdentity, data: String) -> Response {
        let Some((session, write_lock)) = self.lookup(endpoint) else {
            return Response::status(ErrorCode::NoConnection);
        };

        let _guard = write_lock.lock().await;
        let session = match session {
            Some(session) if session.is_open() => session,
            Some(_) => {
                self.drop_replay(endpoint);
                debug!(endpoint = %endpoint, "Send after session ended");
                return Response::status(ErrorCode::NoConnection);
            }
            None => {
                self.enqueue_replay(endpoint, data);
                return Response::status(ErrorCode::WriteFailure);
            }
        };

        if !self.flush_replay(endpoint, &session).await {
            // Keep ordering behind the messages still queued
            self.enqueue_replay(endpoint, data);
            return Response::status(ErrorCode::WriteFailure);
        }

        match session.write(&data).await {
            Ok(()) => Response::success(session.get_message().unwrap_or_default()),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Send failed");
                Response::status(ErrorCode::WriteFailure)
            }
        }
    }

    /// Flushes the replay queue, then pops one inbound message (empty if none).
    ///
    /// Messages that arrived before the session ended are still handed
    /// out; after that the endpoint reports `NO_CONNECTION`.
    pub async fn receive(&self, endpoint: &EndpointIdentity) -> Response {
        let Some((session, write_lock)) = self.lookup(endpoint) else {
            return Response::status(ErrorCode::NoConnection);
        };

        let Some(session) = session else {
            return Response::success("");
        };

        if session.is_open() {
            let _guard = write_lock.lock().await;
            self.flush_replay(endpoint, &session).await;
            return Response::success(session.get_message().unwrap_or_default());
        }

        match session.get_message() {
            Some(message) => Response::success(message),
            None => {
                self.drop_replay(endpoint);
                Response::status(ErrorCode::NoConnection)
            }
        }
    }

    /// Closes every open endpoint and waits for their tasks.
    pub async fn close_all(&self) {
        let contexts: Vec<(EndpointIdentity, SessionContext)> =
            lock(&self.contexts).drain().collect();

        for (_, context) in &contexts {
            context.cancel.cancel();
        }
        for (endpoint, context) in contexts {
            if let Err(e) = context.listener.await {
                warn!(endpoint = %endpoint, error = %e, "Listener task failed during shutdown");
            }
        }
        lock(&self.replay).clear();
        debug!("All endpoints closed");
    }

    /// True if the endpoint has a live, handshaken session.
    pub fn is_open(&self, endpoint: &EndpointIdentity) -> bool {
        lock(&self.contexts)
            .get(endpoint)
            .and_then(|ctx| ctx.session.get())
            .map(|session| session.is_open())
            .unwrap_or(false)
    }

    /// True if the endpoint has a session context, connected or not.
    pub fn is_registered(&self, endpoint: &EndpointIdentity) -> bool {
        lock(&self.contexts).contains_key(endpoint)
    }

    /// Number of messages waiting in the endpoint's replay queue.
    pub fn replay_len(&self, endpoint: &EndpointIdentity) -> usize {
        lock(&self.replay).get(endpoint).map(VecDeque::len).unwrap_or(0)
    }

    pub fn endpoint_count(&self) -> usize {
        lock(&self.contexts).len()
    }

    fn lookup(
        &self,
        endpoint: &EndpointIdentity,
    ) -> Option<(Option<Arc<WebsocketSession>>, Arc<tokio::sync::Mutex<()>>)> {
        lock(&self.contexts).get(endpoint).map(SessionContext::handles)
    }

    fn enqueue_replay(&self, endpoint: &EndpointIdentity, data: String) {
        let mut replay = lock(&self.replay);
        let queue = replay.entry(*endpoint).or_default();
        queue.push_back(data);
        debug!(endpoint = %endpoint, queued = queue.len(), "Message queued for replay");
    }

    fn drop_replay(&self, endpoint: &EndpointIdentity) {
        if let Some(queue) = lock(&self.replay).remove(endpoint) {
            debug!(endpoint = %endpoint, dropped = queue.len(), "Replay queue dropped");
        }
    }

    /// Writes queued messages in FIFO order while the session stays open.
    ///
    /// Stops at the first failure, leaving it and the rest queued. Returns
    /// true if the queue was fully drained. Callers hold the endpoint's
    /// write lock.
    async fn flush_replay(&self, endpoint: &EndpointIdentity, session: &WebsocketSession) -> bool {
        loop {
            let next = lock(&self.replay)
                .get_mut(endpoint)
                .and_then(VecDeque::pop_front);
            let Some(message) = next else {
                return true;
            };

            let written = session.is_open() && session.write(&message).await.is_ok();
            if !written {
                lock(&self.replay)
                    .entry(*endpoint)
                    .or_default()
                    .push_front(message);
                debug!(endpoint = %endpoint, "Replay flush interrupted");
                return false;
            }
            debug!(endpoint = %endpoint, "Replayed queued message");
        }
    }
}

impl Drop for MessageBroker {
    fn drop(&mut self) {
        let contexts = self
            .contexts
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for context in contexts.values() {
            context.cancel.cancel();
        }
        if !contexts.is_empty() {
            debug!(count = contexts.len(), "Broker dropped with open endpoints");
        }
    }
}

// ============================================================================
// RPC Binding
// ============================================================================

/// Plugin exposing the broker through `open`, `close`, `send` and `receive`.
pub struct TransportPlugin {
    broker: Arc<MessageBroker>,
}

impl TransportPlugin {
    pub const NAME: &'static str = "RemoteMessageBroker";

    pub fn new(broker: Arc<MessageBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }
}

/// Collapses a broker status into an RPC response.
///
/// Failures carry a readable message so callers can log the payload as-is.
fn status_response(code: ErrorCode) -> Response {
    if code.is_success() {
        Response::status(code)
    } else {
        Response::with_code(code.message(), code)
    }
}

/// Parses the leading (address, port) pair of a broker call.
fn parse_endpoint(address: &Parameter, port: &Parameter) -> Result<EndpointIdentity, Response> {
    let address = address.as_str().map_err(|e| e.into_response())?;
    let port = port.as_int().map_err(|e| e.into_response())?;
    EndpointIdentity::parse(address, port).map_err(|e| {
        debug!(error = %e, "Rejected endpoint");
        Response::with_code(e.to_string(), ErrorCode::OpenFailure)
    })
}

async fn handle_open(broker: Arc<MessageBroker>, params: Vec<Parameter>) -> Response {
    let ([address, port], threads) = match rta_core::param::take_with_optional::<2>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    let endpoint = match parse_endpoint(&address, &port) {
        Ok(endpoint) => endpoint,
        Err(response) => return response,
    };
    let threads = match threads.map(|t| t.as_int()).transpose() {
        Ok(threads) => threads
            .and_then(|t| usize::try_from(t).ok())
            .unwrap_or(DEFAULT_THREADS),
        Err(e) => return e.into_response(),
    };

    status_response(broker.open_connection(endpoint, threads).await)
}

async fn handle_close(broker: Arc<MessageBroker>, params: Vec<Parameter>) -> Response {
    let [address, port] = match rta_core::param::take::<2>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    match parse_endpoint(&address, &port) {
        Ok(endpoint) => status_response(broker.close_connection(&endpoint).await),
        Err(response) if response.code == ErrorCode::OpenFailure.code() => {
            status_response(ErrorCode::NoConnection)
        }
        Err(response) => response,
    }
}

async fn handle_send(broker: Arc<MessageBroker>, params: Vec<Parameter>) -> Response {
    let [address, port, data] = match rta_core::param::take::<3>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    let data = match data.into_string() {
        Ok(data) => data,
        Err(e) => return e.into_response(),
    };
    match parse_endpoint(&address, &port) {
        Ok(endpoint) => broker.send(&endpoint, data).await,
        Err(response) if response.code == ErrorCode::OpenFailure.code() => {
            Response::status(ErrorCode::NoConnection)
        }
        Err(response) => response,
    }
}

async fn handle_receive(broker: Arc<MessageBroker>, params: Vec<Parameter>) -> Response {
    let [address, port] = match rta_core::param::take::<2>(params) {
        Ok(args) => args,
        Err(e) => return e.into_response(),
    };
    match parse_endpoint(&address, &port) {
        Ok(endpoint) => broker.receive(&endpoint).await,
        Err(response) if response.code == ErrorCode::OpenFailure.code() => {
            Response::status(ErrorCode::NoConnection)
        }
        Err(response) => response,
    }
}

impl AdapterPlugin for TransportPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn bind(&self, table: &mut EndpointTable) {
        let broker = Arc::clone(&self.broker);
        table.bind(endpoints::OPEN, move |params| {
            handle_open(Arc::clone(&broker), params)
        });

        let broker = Arc::clone(&self.broker);
        table.bind(endpoints::CLOSE, move |params| {
            handle_close(Arc::clone(&broker), params)
        });

        let broker = Arc::clone(&self.broker);
        table.bind(endpoints::SEND, move |params| {
            handle_send(Arc::clone(&broker), params)
        });

        let broker = Arc::clone(&self.broker);
        table.bind(endpoints::RECEIVE, move |params| {
            handle_receive(Arc::clone(&broker), params)
        });
    }
}
