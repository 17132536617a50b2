//! Transport channel: client-side lifecycle of one broker endpoint.
//!
//! A [`TransportChannel`] opens a WebSocket endpoint through the server's
//! broker and keeps one background poller calling `receive` on it. Every
//! observable change is reported as a [`ChannelEvent`] on an unbounded
//! channel supplied by the caller.
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► open ──► Connected ──► poller: receive every poll_interval
//!                                         │
//! shutdown() ──► cancel poller ──► await poller ──► close
//! ```
//!
//! The poller is always stopped before `close` is issued.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()` or `.expect()` calls
//! - Observer send failures are logged, never propagated

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rta_core::{ErrorCode, Parameter, Response};
use rta_protocol::endpoints;

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::remote::RemoteClient;

// ============================================================================
// Events
// ============================================================================

/// Notifications emitted by a [`TransportChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// `open` succeeded.
    Connected,
    /// The server reported the endpoint as gone, or the channel was closed.
    Disconnected,
    /// `send` delivered this many bytes.
    BytesWritten(usize),
    /// A message arrived from the remote peer.
    TextMessageReceived(String),
    /// A call failed with a code other than `NO_CONNECTION`.
    Error { code: i64, message: String },
}

// ============================================================================
// Transport Channel
// ============================================================================

/// One broker endpoint as seen from the client.
pub struct TransportChannel {
    client: Arc<RemoteClient>,
    address: String,
    port: u16,
    observer: UnboundedSender<ChannelEvent>,
    poll_interval: Duration,
    connected: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

impl TransportChannel {
    pub fn new(
        client: Arc<RemoteClient>,
        address: impl Into<String>,
        port: u16,
        observer: UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            client,
            address: address.into(),
            port,
            observer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connected: Arc::new(AtomicBool::new(false)),
            cancel_token: CancellationToken::new(),
            poller: None,
        }
    }

    /// Overrides the interval between background `receive` calls.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the background poller is alive.
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|poller| !poller.is_finished())
    }

    fn endpoint_params(&self) -> Vec<Parameter> {
        vec![
            Parameter::string(self.address.as_str()),
            Parameter::int(i64::from(self.port)),
        ]
    }

    /// Opens the endpoint and starts the poller if none is running.
    ///
    /// Calling this again on a connected channel re-issues `open` only.
    pub async fn connect(&mut self) -> Response {
        let response = self
            .client
            .content_call(endpoints::OPEN, self.endpoint_params())
            .await;

        if !response.is_success() {
            warn!(
                address = %self.address,
                port = self.port,
                code = response.code,
                "Failed to open transport channel"
            );
            handle_failure(&response, &self.observer, &self.connected);
            return response;
        }

        self.connected.store(true, Ordering::Release);
        emit(&self.observer, ChannelEvent::Connected);
        info!(address = %self.address, port = self.port, "Transport channel open");

        if !self.is_polling() {
            self.poller = Some(tokio::spawn(poll_receive(
                Arc::clone(&self.client),
                self.endpoint_params(),
                self.observer.clone(),
                Arc::clone(&self.connected),
                self.poll_interval,
                self.cancel_token.clone(),
            )));
        }

        response
    }

    /// Sends `data` to the remote peer.
    ///
    /// A message already waiting on the endpoint is piggybacked on the reply.
    /// Reports `NO_CONNECTION` without a call while the channel is down.
    pub async fn send(&self, data: &str) -> Response {
        if !self.is_connected() {
            warn!(address = %self.address, port = self.port, "Send on a channel that is not connected");
            return Response::status(ErrorCode::NoConnection);
        }

        let mut params = self.endpoint_params();
        params.push(Parameter::string(data));

        let response = self.client.content_call(endpoints::SEND, params).await;
        if response.is_success() {
            emit(&self.observer, ChannelEvent::BytesWritten(data.len()));
            deliver(&response, &self.observer);
        } else {
            handle_failure(&response, &self.observer, &self.connected);
        }
        response
    }

    /// Fetches the next waiting message, if any.
    pub async fn receive(&self) -> Response {
        if !self.is_connected() {
            warn!(address = %self.address, port = self.port, "Receive on a channel that is not connected");
            return Response::status(ErrorCode::NoConnection);
        }

        let response = self
            .client
            .content_call(endpoints::RECEIVE, self.endpoint_params())
            .await;
        if response.is_success() {
            deliver(&response, &self.observer);
        } else {
            handle_failure(&response, &self.observer, &self.connected);
        }
        response
    }

    /// Stops the poller, then closes the endpoint if it is open.
    pub async fn shutdown(&mut self) -> Response {
        self.cancel_token.cancel();
        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.await {
                warn!(error = %e, "Transport poller ended abnormally");
            }
        }
        self.cancel_token = CancellationToken::new();

        if !self.connected.swap(false, Ordering::AcqRel) {
            return Response::status(ErrorCode::Success);
        }

        let response = self
            .client
            .content_call(endpoints::CLOSE, self.endpoint_params())
            .await;
        emit(&self.observer, ChannelEvent::Disconnected);
        info!(address = %self.address, port = self.port, code = response.code, "Transport channel closed");
        response
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

// ============================================================================
// Poller
// ============================================================================

async fn poll_receive(
    client: Arc<RemoteClient>,
    params: Vec<Parameter>,
    observer: UnboundedSender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    debug!("Transport poller started");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let response = tokio::select! {
            _ = cancel_token.cancelled() => break,
            response = client.content_call(endpoints::RECEIVE, params.clone()) => response,
        };

        if response.code == ErrorCode::NoConnection.code() {
            connection_lost(&observer, &connected);
            break;
        }
        if response.is_success() {
            deliver(&response, &observer);
        } else {
            debug!(code = response.code, "Poll receive failed");
        }
    }

    debug!("Transport poller stopped");
}

// ============================================================================
// Helpers
// ============================================================================

fn emit(observer: &UnboundedSender<ChannelEvent>, event: ChannelEvent) {
    if observer.send(event).is_err() {
        debug!("Channel observer dropped");
    }
}

fn deliver(response: &Response, observer: &UnboundedSender<ChannelEvent>) {
    if !response.payload.is_empty() {
        emit(
            observer,
            ChannelEvent::TextMessageReceived(response.payload.clone()),
        );
    }
}

/// Marks the channel down, announcing it only on the first report.
fn connection_lost(observer: &UnboundedSender<ChannelEvent>, connected: &AtomicBool) {
    if connected.swap(false, Ordering::AcqRel) {
        info!("Transport channel lost its endpoint");
        emit(observer, ChannelEvent::Disconnected);
    }
}

fn handle_failure(
    response: &Response,
    observer: &UnboundedSender<ChannelEvent>,
    connected: &AtomicBool,
) {
    if response.code == ErrorCode::NoConnection.code() {
        connection_lost(observer, connected);
    } else {
        emit(
            observer,
            ChannelEvent::Error {
                code: response.code,
                message: response.payload.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::{sleep, timeout};

    const POLL: Duration = Duration::from_millis(5);

    async fn channel_over(
        connection: Arc<MockConnection>,
    ) -> (TransportChannel, UnboundedReceiver<ChannelEvent>) {
        let client = Arc::new(RemoteClient::new(connection).await);
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = TransportChannel::new(client, "127.0.0.1", 7070, tx).with_poll_interval(POLL);
        (channel, rx)
    }

    async fn next_event(rx: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time")
            .expect("observer open")
    }

    #[tokio::test]
    async fn test_connect_opens_and_polls() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let connection = MockConnection::new(move |method, _| match method {
            endpoints::RECEIVE if counter.fetch_add(1, Ordering::SeqCst) == 0 => {
                Response::success("hello")
            }
            _ => Response::success(""),
        });
        let (mut channel, mut rx) = channel_over(connection.clone()).await;

        assert!(channel.connect().await.is_success());
        assert!(channel.is_connected());
        assert!(channel.is_polling());
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);
        assert_eq!(
            next_event(&mut rx).await,
            ChannelEvent::TextMessageReceived("hello".to_string())
        );

        let open = &connection.calls()[1];
        assert_eq!(open.0, "open");
        assert_eq!(
            open.1,
            vec![Parameter::string("127.0.0.1"), Parameter::int(7070)]
        );

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_connect_reissues_open_only() {
        let connection = MockConnection::succeeding();
        let (mut channel, mut rx) = channel_over(connection.clone()).await;

        channel.connect().await;
        channel.connect().await;

        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);
        assert!(channel.is_polling());
        let opens = connection.methods().iter().filter(|m| *m == "open").count();
        assert_eq!(opens, 2);

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_open_starts_no_poller() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::OPEN => Response::with_code("", ErrorCode::OpenFailure),
            _ => Response::success(""),
        });
        let (mut channel, mut rx) = channel_over(connection.clone()).await;

        let response = channel.connect().await;
        assert_eq!(response.code, ErrorCode::OpenFailure.code());
        assert!(!channel.is_connected());
        assert!(!channel.is_polling());
        assert_eq!(
            next_event(&mut rx).await,
            ChannelEvent::Error {
                code: ErrorCode::OpenFailure.code(),
                message: String::new(),
            }
        );

        sleep(POLL * 4).await;
        assert!(!connection.methods().iter().any(|m| m == "receive"));
    }

    #[tokio::test]
    async fn test_send_reports_bytes_and_piggybacked_message() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::SEND => Response::success("pong"),
            _ => Response::success(""),
        });
        let (mut channel, mut rx) = channel_over(connection.clone()).await;
        channel.connect().await;
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);

        let response = channel.send("ping!").await;
        assert_eq!(response, Response::success("pong"));
        assert_eq!(next_event(&mut rx).await, ChannelEvent::BytesWritten(5));
        assert_eq!(
            next_event(&mut rx).await,
            ChannelEvent::TextMessageReceived("pong".to_string())
        );

        let calls = connection.calls();
        let send = calls.iter().find(|(method, _)| method == "send").unwrap();
        assert_eq!(send.1[2], Parameter::string("ping!"));

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn test_calls_before_connect_skip_the_wire() {
        let connection = MockConnection::succeeding();
        let (channel, mut rx) = channel_over(connection.clone()).await;

        assert_eq!(
            channel.send("early").await.code,
            ErrorCode::NoConnection.code()
        );
        assert_eq!(channel.receive().await.code, ErrorCode::NoConnection.code());

        assert_eq!(connection.methods(), vec!["client_connected"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lost_endpoint_disconnects_once() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::CLIENT_CONNECTED | endpoints::OPEN => Response::success(""),
            _ => Response::status(ErrorCode::NoConnection),
        });
        let (mut channel, mut rx) = channel_over(connection.clone()).await;
        channel.connect().await;
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);

        // Whichever of the poller and this call sees it first reports it
        let response = channel.receive().await;
        assert_eq!(response.code, ErrorCode::NoConnection.code());
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Disconnected);
        assert!(!channel.is_connected());

        let sends_before = connection.methods().iter().filter(|m| *m == "send").count();
        assert_eq!(channel.send("after").await.code, ErrorCode::NoConnection.code());
        assert_eq!(channel.receive().await.code, ErrorCode::NoConnection.code());
        let sends_after = connection.methods().iter().filter(|m| *m == "send").count();
        assert_eq!(sends_before, sends_after);

        sleep(POLL * 4).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poller_stops_when_endpoint_disappears() {
        let connection = MockConnection::new(|method, _| match method {
            endpoints::RECEIVE => Response::status(ErrorCode::NoConnection),
            _ => Response::success(""),
        });
        let (mut channel, mut rx) = channel_over(connection.clone()).await;

        channel.connect().await;
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Disconnected);
        assert!(!channel.is_connected());

        sleep(POLL * 4).await;
        assert!(!channel.is_polling());
        let receives = connection.methods().iter().filter(|m| *m == "receive").count();
        assert_eq!(receives, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_poller_before_close() {
        let connection = MockConnection::succeeding();
        let (mut channel, mut rx) = channel_over(connection.clone()).await;

        channel.connect().await;
        sleep(POLL * 4).await;
        assert!(channel.shutdown().await.is_success());
        assert!(!channel.is_polling());

        sleep(POLL * 4).await;
        let methods = connection.methods();
        assert_eq!(methods.last().map(String::as_str), Some("close"));
        assert_eq!(methods.iter().filter(|m| *m == "close").count(), 1);

        assert_eq!(next_event(&mut rx).await, ChannelEvent::Connected);
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_without_connect_skips_close() {
        let connection = MockConnection::succeeding();
        let (mut channel, _rx) = channel_over(connection.clone()).await;

        assert!(channel.shutdown().await.is_success());
        assert_eq!(connection.methods(), vec!["client_connected"]);
    }
}
