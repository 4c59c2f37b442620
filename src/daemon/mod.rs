// src/daemon/mod.rs

//! Container daemon client
//!
//! Talks HTTP/1.1 to a container engine daemon over a Unix domain socket or
//! over TCP (optionally TLS).
//!
//! ```text
//! DaemonConnection ──Request──► Transport ──► DaemonResponse
//!   (builder)                   unix / tcp      head + body stream
//! ```
//!
//! # Module Structure
//!
//! - `connection` - Request builder and request entities
//! - `transport` - Unix-socket and TCP transports, endpoint parsing
//! - `response` - Status line and header parsing, body selection
//! - `chunked` - Chunked transfer encoding
//! - `body` - Bounded and self-releasing body streams
//! - `client` - Typed calls (ping, version, containers)

pub mod body;
pub mod chunked;
pub mod client;
pub mod connection;
pub mod response;
pub mod transport;

use std::path::PathBuf;
use std::time::Duration;

pub use body::{BodyStream, BoundedBodyReader, CloseOnExhaust, ConnectionRelease};
pub use chunked::{ChunkedBodyDecoder, ChunkedBodyEncoder};
pub use client::{DaemonClient, DaemonVersion};
pub use connection::{DaemonConnection, Method, Request, RequestBody};
pub use response::{DaemonResponse, ResponseHead};
pub use transport::{DaemonEndpoint, TcpTransport, Transport, UnixSocketTransport, transport_for};

/// Default daemon endpoint
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Default connect and read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// TLS material for TCP endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA bundle used to verify the daemon
    pub ca_cert: Option<PathBuf>,
    /// Client certificate (PEM)
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM)
    pub client_key: Option<PathBuf>,
}

/// Daemon connection settings
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// `unix:///path`, `tcp://host:port`, `http://...` or `https://...`
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Present when TCP connections should use TLS
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            tls: None,
        }
    }
}

impl DaemonConfig {
    /// Set the endpoint URI
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set connect and read timeouts
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Enable TLS for TCP endpoints
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}
