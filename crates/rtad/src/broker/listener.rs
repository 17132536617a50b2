//! Connects to an endpoint and runs exactly one session on it.
//!
//! Connection failures are retried with a fixed delay until the listener is
//! cancelled; there is no give-up. Once a session is established the
//! listener stops retrying and simply waits for that session to end.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rta_core::EndpointIdentity;

use super::session::WebsocketSession;

/// Delay between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Slot the listener fills once the handshake has completed.
pub type SessionSlot = Arc<OnceLock<Arc<WebsocketSession>>>;

pub struct SessionListener {
    endpoint: EndpointIdentity,
    slot: SessionSlot,
    retry_delay: Duration,
}

impl SessionListener {
    pub fn new(endpoint: EndpointIdentity, slot: SessionSlot) -> Self {
        Self {
            endpoint,
            slot,
            retry_delay: RECONNECT_DELAY,
        }
    }

    /// Runs until cancelled or until the established session ends.
    pub async fn run(self, cancel: CancellationToken) {
        let url = self.endpoint.ws_url();
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(endpoint = %self.endpoint, attempt, "Listener stopped before connecting");
                    return;
                }

                result = connect_async(url.as_str()) => {
                    match result {
                        Ok((ws, _response)) => {
                            info!(endpoint = %self.endpoint, attempt, "WebSocket handshake complete");
                            let (session, actor) =
                                WebsocketSession::spawn(ws, self.endpoint, cancel.child_token());
                            // Only this listener ever fills the slot
                            let _ = self.slot.set(Arc::new(session));
                            let _ = actor.await;
                            debug!(endpoint = %self.endpoint, "Listener finished");
                            return;
                        }
                        Err(e) => {
                            if attempt == 1 {
                                info!(endpoint = %self.endpoint, error = %e, "Endpoint not reachable, will retry");
                            } else {
                                debug!(endpoint = %self.endpoint, attempt, error = %e, "Connection attempt failed");
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(endpoint = %self.endpoint, attempt, "Listener cancelled during retry delay");
                    return;
                }
                _ = sleep(self.retry_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listener_stops_on_cancel_without_peer() {
        // Reserve a port, then free it so nothing listens there
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let endpoint = EndpointIdentity::parse("127.0.0.1", i64::from(port)).unwrap();
        let slot: SessionSlot = Arc::new(OnceLock::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(SessionListener::new(endpoint, slot.clone()).run(cancel.clone()));
        sleep(Duration::from_millis(100)).await;
        assert!(slot.get().is_none());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("listener should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_listener_retries_until_peer_appears() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let endpoint = EndpointIdentity::parse("127.0.0.1", i64::from(port)).unwrap();
        let slot: SessionSlot = Arc::new(OnceLock::new());
        let cancel = CancellationToken::new();

        tokio::spawn(SessionListener::new(endpoint, slot.clone()).run(cancel.clone()));
        sleep(RECONNECT_DELAY * 2).await;

        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let mut established = false;
        for _ in 0..100 {
            if slot.get().map(|s| s.is_open()).unwrap_or(false) {
                established = true;
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(established);

        cancel.cancel();
    }
}
