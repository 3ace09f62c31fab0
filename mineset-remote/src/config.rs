use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::error::{RemoteError, Result};

/// Port used by mining endpoints when the URI does not name one
pub const DEFAULT_MINING_PORT: u16 = 8025;

/// Transport configuration for remote mining endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Upper bound for the handshake of a new connection
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// Upper bound for a single request/response exchange
    #[serde(default = "default_response_timeout")]
    pub response_timeout: Duration,

    /// Capacity of the outgoing request queue of each connection
    #[serde(default = "default_request_queue_size")]
    pub request_queue_size: usize,

    /// Maximum accepted length of a single protocol line
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// User agent announced in the handshake
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connection_timeout: default_connection_timeout(),
            response_timeout: default_response_timeout(),
            request_queue_size: default_request_queue_size(),
            max_line_length: default_max_line_length(),
            user_agent: default_user_agent(),
        }
    }
}

/// Host and port of a remote mining endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `ws://host[:port][/path]` or `tcp://host[:port]`
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("ws://")
            .or_else(|| uri.strip_prefix("tcp://"))
            .ok_or_else(|| RemoteError::InvalidUri(format!("unsupported scheme in {}", uri)))?;

        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(RemoteError::InvalidUri(format!("missing host in {}", uri)));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| RemoteError::InvalidUri(format!("invalid port in {}", uri)))?;
                (host, port)
            }
            None => (authority, DEFAULT_MINING_PORT),
        };

        if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '@') {
            return Err(RemoteError::InvalidUri(format!("invalid host in {}", uri)));
        }
        if port == 0 {
            return Err(RemoteError::InvalidUri(format!("invalid port in {}", uri)));
        }

        Ok(Self { host: host.to_string(), port })
    }

    /// Socket address string usable with `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Default value functions for serde
fn default_connection_timeout() -> Duration { Duration::from_secs(30) }
fn default_response_timeout() -> Duration { Duration::from_secs(10) }
fn default_request_queue_size() -> usize { 100 }
fn default_max_line_length() -> usize { 64 * 1024 }
fn default_user_agent() -> String {
    format!("Mineset/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ws_uri() {
        let endpoint = Endpoint::parse("ws://mining.example.com:8025").unwrap();
        assert_eq!(endpoint.host, "mining.example.com");
        assert_eq!(endpoint.port, 8025);
    }

    #[test]
    fn test_parse_default_port_and_path() {
        let endpoint = Endpoint::parse("ws://localhost/mining").unwrap();
        assert_eq!(endpoint.address(), "localhost:8025");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Endpoint::parse("http://localhost:8025").is_err());
        assert!(Endpoint::parse("ws://").is_err());
        assert!(Endpoint::parse("ws://host:notaport").is_err());
        assert!(Endpoint::parse("ws://host:0").is_err());
        assert!(Endpoint::parse("tcp://bad host:1").is_err());
    }
}
