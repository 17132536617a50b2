//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use rta_core::{DEFAULT_DOWNLOAD_DIR, DEFAULT_PORT};

/// Default timeout for a single RPC call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default interval between `receive` polls of a transport channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Configuration for the RPC client.
///
/// Controls the server address, retry logic when connecting, and where
/// chunked downloads land.
///
/// # Example
///
/// ```rust
/// use rta_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     host: "10.0.0.7".to_string(),
///     retry_initial_delay: Duration::from_millis(50),
///     ..Default::default()
/// };
/// assert_eq!(config.address(), "10.0.0.7:5555");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server TCP port.
    pub port: u16,

    /// Timeout applied to every RPC call.
    pub call_timeout: Duration,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,

    /// Connection attempts before giving up.
    pub max_connect_attempts: u32,

    /// Directory chunked downloads are written to.
    pub download_dir: PathBuf,

    /// Interval between `receive` polls of a transport channel.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            retry_multiplier: 2.0,
            max_connect_attempts: 5,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// `host:port`, as passed to the socket connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
