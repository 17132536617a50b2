//! Server configuration.
//!
//! Defaults can be overridden from the environment, then by command-line
//! flags in the binary.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tracing::warn;

use rta_core::DEFAULT_PORT;

/// Environment variable overriding [`ServerConfig::bind_address`].
pub const ENV_BIND_ADDRESS: &str = "RTA_BIND_ADDRESS";

/// Environment variable overriding [`ServerConfig::plugin_dir`].
pub const ENV_PLUGIN_DIR: &str = "RTA_PLUGIN_DIR";

/// Configuration for the RPC server.
///
/// # Example
///
/// ```rust
/// use rtad::config::ServerConfig;
///
/// let config = ServerConfig {
///     port: 7000,
///     ..Default::default()
/// };
/// assert_eq!(config.socket_addr().port(), 7000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the RPC listener binds to.
    pub bind_address: IpAddr,

    /// TCP port of the RPC listener. Zero picks an ephemeral port.
    pub port: u16,

    /// Directory scanned for plugin modules at startup.
    pub plugin_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            plugin_dir: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied.
    ///
    /// An unparsable `RTA_BIND_ADDRESS` is logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_BIND_ADDRESS) {
            match value.parse() {
                Ok(address) => config.bind_address = address,
                Err(e) => warn!(value = %value, error = %e, "Ignoring invalid {ENV_BIND_ADDRESS}"),
            }
        }

        if let Some(dir) = env::var_os(ENV_PLUGIN_DIR) {
            config.plugin_dir = PathBuf::from(dir);
        }

        config
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
