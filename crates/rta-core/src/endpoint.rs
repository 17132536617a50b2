//! Endpoint identity: the (address, port) key used by every transport map.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A validated network address paired with a port.
///
/// Two identities are equal iff both address and port are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointIdentity {
    address: IpAddr,
    port: u16,
}

impl EndpointIdentity {
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Parses an address literal and a signed port as received over RPC.
    ///
    /// Host names are rejected: the address must be an IPv4 or IPv6 literal.
    pub fn parse(address: &str, port: i64) -> DomainResult<Self> {
        let address: IpAddr =
            address
                .trim()
                .parse()
                .map_err(|e: std::net::AddrParseError| DomainError::InvalidAddress {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        let port = u16::try_from(port).map_err(|_| DomainError::InvalidPort { value: port })?;
        Ok(Self { address, port })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// WebSocket URL for the session on this endpoint, always targeting `/`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.socket_addr())
    }
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl From<SocketAddr> for EndpointIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_ipv4() {
        let id = EndpointIdentity::parse("127.0.0.1", 7070).unwrap();
        assert_eq!(id.port(), 7070);
        assert_eq!(id.to_string(), "127.0.0.1:7070");
        assert_eq!(id.ws_url(), "ws://127.0.0.1:7070/");
    }

    #[test]
    fn test_parse_ipv6() {
        let id = EndpointIdentity::parse("::1", 8080).unwrap();
        assert_eq!(id.ws_url(), "ws://[::1]:8080/");
    }

    #[test]
    fn test_parse_rejects_hostname() {
        let err = EndpointIdentity::parse("localhost", 80).unwrap_err();
        assert!(matches!(err, DomainError::InvalidAddress { .. }));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert_eq!(
            EndpointIdentity::parse("10.0.0.1", 70000),
            Err(DomainError::InvalidPort { value: 70000 })
        );
        assert!(EndpointIdentity::parse("10.0.0.1", -1).is_err());
    }

    #[test]
    fn test_identity_as_map_key() {
        let mut map = HashMap::new();
        map.insert(EndpointIdentity::parse("10.0.0.1", 1).unwrap(), "a");
        map.insert(EndpointIdentity::parse("10.0.0.1", 2).unwrap(), "b");
        map.insert(EndpointIdentity::parse("10.0.0.1", 1).unwrap(), "c");

        assert_eq!(map.len(), 2);
        assert_eq!(map[&EndpointIdentity::parse("10.0.0.1", 1).unwrap()], "c");
    }
}
