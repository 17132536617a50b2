//! End-to-end tests: the real server driven through the client library.
//!
//! Per CLAUDE.md: Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rta_client::{
    AdapterClient, ChannelEvent, ClientConfig, RemoteClient, TcpRpcConnection, TransportChannel,
};
use rta_core::{AppStatus, ErrorCode, MAX_CHUNK_SIZE};
use rtad::{AdapterPlugin, EndpointTable, MessageBroker, RpcServer, TransportPlugin, UtilsManager};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    address: SocketAddr,
    broker: Arc<MessageBroker>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        let broker = Arc::new(MessageBroker::new());
        let mut table = EndpointTable::with_client_connected();
        TransportPlugin::new(Arc::clone(&broker)).bind(&mut table);
        UtilsManager::new().bind(&mut table);

        let cancel_token = CancellationToken::new();
        let server = RpcServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(table),
            cancel_token.clone(),
        )
        .await
        .expect("bind server");
        let address = server.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestServer {
            address,
            broker,
            cancel_token,
        }
    }

    fn client_config(&self, download_dir: &std::path::Path) -> ClientConfig {
        ClientConfig {
            port: self.address.port(),
            download_dir: download_dir.to_path_buf(),
            ..Default::default()
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        self.broker.close_all().await;
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

async fn remote_client(config: &ClientConfig) -> Arc<RemoteClient> {
    let connection = Arc::new(TcpRpcConnection::connect(config).await.unwrap());
    Arc::new(RemoteClient::with_download_dir(connection, &config.download_dir).await)
}

/// Runs a WebSocket peer on an ephemeral port that echoes every text frame.
async fn spawn_echo_peer() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    port
}

// ============================================================================
// Chunked Download Tests
// ============================================================================

#[tokio::test]
async fn test_file_content_downloads_multi_chunk_file() {
    let server = TestServer::spawn().await;
    let remote_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();

    let chunk = MAX_CHUNK_SIZE as usize;
    let content: String = (0..2 * chunk + 17)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    std::fs::write(remote_dir.path().join("big.log"), &content).unwrap();

    let client = AdapterClient::new(remote_client(&server.client_config(local_dir.path())).await);
    let response = client
        .file_content(remote_dir.path().to_str().unwrap(), "big.log")
        .await;

    assert!(response.is_success(), "download failed: {}", response.payload);
    let local = local_dir.path().join("big.log");
    assert_eq!(response.payload, local.display().to_string());
    assert_eq!(std::fs::read_to_string(local).unwrap(), content);

    server.shutdown().await;
}

#[tokio::test]
async fn test_file_content_exact_chunk_size() {
    let server = TestServer::spawn().await;
    let remote_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();

    let content = "z".repeat(MAX_CHUNK_SIZE as usize);
    std::fs::write(remote_dir.path().join("exact"), &content).unwrap();

    let client = AdapterClient::new(remote_client(&server.client_config(local_dir.path())).await);
    let response = client
        .file_content(remote_dir.path().to_str().unwrap(), "exact")
        .await;

    assert!(response.is_success());
    assert_eq!(
        std::fs::read_to_string(local_dir.path().join("exact")).unwrap(),
        content
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_file_content_missing_file_fails() {
    let server = TestServer::spawn().await;
    let remote_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();

    let client = AdapterClient::new(remote_client(&server.client_config(local_dir.path())).await);
    let response = client
        .file_content(remote_dir.path().to_str().unwrap(), "absent")
        .await;

    assert_eq!(response.code, ErrorCode::Failed.code());
    assert!(!local_dir.path().join("absent").exists());

    server.shutdown().await;
}

// ============================================================================
// Utility Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_file_and_folder_round_trip() {
    let server = TestServer::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();
    let client = AdapterClient::new(remote_client(&server.client_config(local_dir.path())).await);

    let folder = dir.path().join("work");
    let folder = folder.to_str().unwrap();
    assert!(client.folder_create(folder).await.is_success());
    assert!(client.folder_exists(folder).await.is_success());
    assert!(client.file_update(folder, "conf", "a=1").await.is_success());
    assert!(client.file_exists(folder, "conf").await.is_success());
    assert!(client.folder_delete(folder).await.is_success());
    assert!(!client.folder_exists(folder).await.is_success());

    assert_eq!(client.app_status("rta-no-such-app").await, Some(AppStatus::NotRunning));

    let response = client.command_execute("echo over-the-wire").await;
    assert_eq!(response.payload.trim(), "over-the-wire");

    server.shutdown().await;
}

// ============================================================================
// Transport Channel Tests
// ============================================================================

#[tokio::test]
async fn test_channel_echoes_through_broker() {
    let server = TestServer::spawn().await;
    let local_dir = tempfile::tempdir().unwrap();
    let peer_port = spawn_echo_peer().await;

    let client = remote_client(&server.client_config(local_dir.path())).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = TransportChannel::new(client, "127.0.0.1", peer_port, tx);

    assert!(channel.connect().await.is_success());
    // May be queued for replay while the handshake is pending
    channel.send("hello").await;

    let echoed = timeout(EVENT_TIMEOUT, async {
        while let Some(event) = rx.recv().await {
            if event == ChannelEvent::TextMessageReceived("hello".to_string()) {
                return true;
            }
        }
        false
    })
    .await
    .expect("echo in time");
    assert!(echoed);

    assert!(channel.shutdown().await.is_success());
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_shutdown_disconnects_client() {
    let server = TestServer::spawn().await;
    let local_dir = tempfile::tempdir().unwrap();
    let client = remote_client(&server.client_config(local_dir.path())).await;
    assert!(client.connected());

    server.shutdown().await;

    for _ in 0..50 {
        if !client.connected() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!client.connected());

    let response = client.content_call("client_connected", vec![]).await;
    assert_eq!(response.code, ErrorCode::NoConnection.code());
}
