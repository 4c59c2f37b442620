// src/daemon/transport.rs

//! Daemon transports
//!
//! Two ways to reach the daemon:
//!
//! - `unix:///path/to/socket` goes through [`UnixSocketTransport`], which
//!   writes the request by hand and hands the raw socket to
//!   [`DaemonResponse`] for parsing.
//! - `tcp://host:port`, `http://` and `https://` go through [`TcpTransport`],
//!   a blocking `reqwest` client with optional client-certificate TLS.
//!
//! [`transport_for`] picks one from the configured endpoint.

use super::body::ConnectionRelease;
use super::chunked::ChunkedBodyEncoder;
use super::connection::{Method, Request, RequestBody};
use super::response::{DaemonResponse, ResponseHead};
use super::{DaemonConfig, TlsConfig};
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default port for plain `tcp://` endpoints
const DEFAULT_PLAIN_PORT: u16 = 2375;

/// Default port for `tcp://` endpoints with TLS configured
const DEFAULT_TLS_PORT: u16 = 2376;

/// Something that can carry one request to the daemon and hand back its
/// response
pub trait Transport: Send + Sync {
    fn execute(&self, request: Request) -> Result<DaemonResponse>;

    /// Human-readable endpoint, for logs
    fn describe(&self) -> String;
}

/// Where the daemon lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    Unix(PathBuf),
    Tcp(Url),
}

impl DaemonEndpoint {
    /// Parse an endpoint URI.
    ///
    /// `tcp://` becomes `https://` when TLS material is configured and
    /// `http://` otherwise.
    pub fn parse(uri: &str, tls: bool) -> Result<Self> {
        let uri = uri.trim();
        if let Some(path) = uri.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::Config(format!(
                    "Daemon endpoint '{}' has no socket path",
                    uri
                )));
            }
            return Ok(DaemonEndpoint::Unix(PathBuf::from(path)));
        }

        let url = if let Some(rest) = uri.strip_prefix("tcp://") {
            let scheme = if tls { "https" } else { "http" };
            let mut url = Url::parse(&format!("{scheme}://{rest}"))
                .map_err(|e| Error::Config(format!("Invalid daemon endpoint '{}': {}", uri, e)))?;
            if url.port().is_none() {
                let port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PLAIN_PORT };
                url.set_port(Some(port)).map_err(|_| {
                    Error::Config(format!("Daemon endpoint '{}' cannot carry a port", uri))
                })?;
            }
            url
        } else {
            let url = Url::parse(uri)
                .map_err(|e| Error::Config(format!("Invalid daemon endpoint '{}': {}", uri, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "Unsupported daemon endpoint scheme '{}' (expected unix, tcp, http or https)",
                    url.scheme()
                )));
            }
            url
        };

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::Config(format!("Daemon endpoint '{}' has no host", uri)));
        }
        Ok(DaemonEndpoint::Tcp(url))
    }
}

/// Build the transport for the configured endpoint
pub fn transport_for(config: &DaemonConfig) -> Result<Arc<dyn Transport>> {
    let endpoint = DaemonEndpoint::parse(&config.endpoint, config.tls.is_some())?;
    let transport: Arc<dyn Transport> = match endpoint {
        DaemonEndpoint::Unix(path) => Arc::new(
            UnixSocketTransport::new(path).with_timeout(config.read_timeout),
        ),
        DaemonEndpoint::Tcp(url) => Arc::new(TcpTransport::new(url, config)?),
    };
    info!("Daemon transport: {}", transport.describe());
    Ok(transport)
}

/// Transport over a local Unix domain socket.
///
/// Each request opens a fresh connection. The response owns it and shuts it
/// down on release.
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    socket_path: PathBuf,
    timeout: Option<Duration>,
}

impl UnixSocketTransport {
    pub fn new<P: Into<PathBuf>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: None,
        }
    }

    /// Read and write timeout on each connection
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Transport for UnixSocketTransport {
    fn execute(&self, request: Request) -> Result<DaemonResponse> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            Error::Transport(format!(
                "Failed to connect to daemon socket {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;
        stream
            .set_read_timeout(self.timeout)
            .and_then(|()| stream.set_write_timeout(self.timeout))
            .map_err(|e| Error::Transport(format!("Failed to set socket timeout: {}", e)))?;

        let shutdown_handle = stream
            .try_clone()
            .map_err(|e| Error::Transport(format!("Failed to clone socket handle: {}", e)))?;
        let release = ConnectionRelease::new(move || {
            // Already closed by the peer is fine
            let _ = shutdown_handle.shutdown(Shutdown::Both);
            debug!("daemon socket released");
        });

        let head_request = request.method == Method::Head;
        {
            let mut writer = BufWriter::new(&stream);
            write_request(&mut writer, request)?;
        }

        let response = DaemonResponse::from_raw(BufReader::new(stream), release);
        Ok(if head_request {
            response.for_head_request()
        } else {
            response
        })
    }

    fn describe(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }
}

/// Serialize a request onto a raw stream.
///
/// Adds `Host: localhost` and `Connection: close` unless the caller set them.
/// In-memory bodies get a `Content-Length`; streamed bodies are sent chunked
/// unless the caller supplied a length. Nothing is written when a header
/// would break the header block.
pub(crate) fn write_request<W: Write>(out: &mut W, request: Request) -> Result<()> {
    request.check_headers()?;
    let wire = |e: io::Error| Error::Transport(format!("Failed to send request: {}", e));

    write!(out, "{} {} HTTP/1.1\r\n", request.method, request.target()).map_err(wire)?;
    if !request.has_header("Host") {
        out.write_all(b"Host: localhost\r\n").map_err(wire)?;
    }
    for (name, value) in &request.headers {
        write!(out, "{}: {}\r\n", name, value).map_err(wire)?;
    }
    if !request.has_header("Connection") {
        out.write_all(b"Connection: close\r\n").map_err(wire)?;
    }

    let caller_length = request.has_header("Content-Length");
    let caller_encoding = request.has_header("Transfer-Encoding");
    match request.body {
        None => {
            out.write_all(b"\r\n").map_err(wire)?;
        }
        Some(RequestBody::Stream(mut reader)) => {
            if caller_length {
                out.write_all(b"\r\n").map_err(wire)?;
                io::copy(&mut reader, out).map_err(wire)?;
            } else {
                if !caller_encoding {
                    out.write_all(b"Transfer-Encoding: chunked\r\n").map_err(wire)?;
                }
                out.write_all(b"\r\n").map_err(wire)?;
                let mut encoder = ChunkedBodyEncoder::new(&mut *out);
                io::copy(&mut reader, &mut encoder).map_err(wire)?;
                encoder.finish().map_err(wire)?;
            }
        }
        Some(RequestBody::Bytes(bytes)) => write_sized(out, &bytes, caller_length).map_err(wire)?,
        Some(RequestBody::Text(text)) => {
            write_sized(out, text.as_bytes(), caller_length).map_err(wire)?
        }
    }
    out.flush().map_err(wire)
}

fn write_sized<W: Write>(out: &mut W, bytes: &[u8], caller_length: bool) -> io::Result<()> {
    if !caller_length {
        write!(out, "Content-Length: {}\r\n", bytes.len())?;
    }
    out.write_all(b"\r\n")?;
    out.write_all(bytes)
}

/// Transport over TCP, optionally with TLS, through a blocking HTTP client
pub struct TcpTransport {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl TcpTransport {
    pub fn new(base_url: Url, config: &DaemonConfig) -> Result<Self> {
        // The daemon is always dialed directly, never through *_PROXY
        let mut builder = reqwest::blocking::Client::builder()
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout);

        if let Some(tls) = &config.tls {
            builder = configure_tls(builder.use_rustls_tls(), tls)?;
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, client })
    }

    fn url_for(&self, request: &Request) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            request.target()
        )
    }
}

fn configure_tls(
    mut builder: reqwest::blocking::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::blocking::ClientBuilder> {
    match (&tls.client_cert, &tls.client_key) {
        (Some(cert_path), Some(key_path)) => {
            let cert_pem = read_pem(cert_path, "client certificate")?;
            let key_pem = read_pem(key_path, "client key")?;
            let identity = reqwest::Identity::from_pem(&[cert_pem, key_pem].concat())
                .map_err(|e| Error::Config(format!("Failed to create TLS identity: {e}")))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(Error::Config(
                "TLS client certificate and key must be configured together".to_string(),
            ));
        }
    }

    if let Some(ca_path) = &tls.ca_cert {
        let ca_pem = read_pem(ca_path, "CA certificate")?;
        let ca_cert = reqwest::Certificate::from_pem(&ca_pem)
            .map_err(|e| Error::Config(format!("Failed to parse CA certificate: {e}")))?;
        builder = builder.add_root_certificate(ca_cert);
    }
    Ok(builder)
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Config(format!("Failed to read {} '{}': {}", what, path.display(), e))
    })
}

impl Transport for TcpTransport {
    fn execute(&self, request: Request) -> Result<DaemonResponse> {
        request.check_headers()?;
        let url = self.url_for(&request);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::Transport(format!("Invalid request method: {e}")))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            None => builder,
            Some(RequestBody::Stream(reader)) => {
                builder.body(reqwest::blocking::Body::new(reader))
            }
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes),
            Some(RequestBody::Text(text)) => builder.body(text.into_bytes()),
        };

        let response = builder
            .send()
            .map_err(|e| Error::Transport(format!("Request to {} failed: {}", url, e)))?;

        let head = head_of(&response);
        debug!(status = %head.status_line(), "daemon responded over TCP");
        // The client owns connection reuse; dropping the response returns it
        Ok(DaemonResponse::from_parts(head, response, ConnectionRelease::noop()))
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

/// Rebuild a status line and header block from an already-framed response
fn head_of(response: &reqwest::blocking::Response) -> ResponseHead {
    let status = response.status();
    let status_line = format!(
        "{:?} {} {}",
        response.version(),
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            format!("{}: {}", name.as_str(), String::from_utf8_lossy(value.as_bytes()))
        })
        .collect();
    ResponseHead::new(status_line.trim_end(), headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn render(request: Request) -> String {
        let mut out = Vec::new();
        write_request(&mut out, request).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_unix_endpoint() {
        assert_eq!(
            DaemonEndpoint::parse("unix:///var/run/docker.sock", false).unwrap(),
            DaemonEndpoint::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert!(DaemonEndpoint::parse("unix://", false).is_err());
    }

    #[test]
    fn test_parse_tcp_endpoint_scheme_follows_tls() {
        let DaemonEndpoint::Tcp(plain) = DaemonEndpoint::parse("tcp://10.0.0.5:2375", false).unwrap()
        else {
            panic!("expected tcp endpoint");
        };
        assert_eq!(plain.as_str(), "http://10.0.0.5:2375/");

        let DaemonEndpoint::Tcp(secure) = DaemonEndpoint::parse("tcp://daemon.local", true).unwrap()
        else {
            panic!("expected tcp endpoint");
        };
        assert_eq!(secure.as_str(), "https://daemon.local:2376/");
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = DaemonEndpoint::parse("ftp://daemon", false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(DaemonEndpoint::parse("not a uri", false).is_err());
    }

    #[test]
    fn test_write_request_defaults() {
        let wire = render(Request {
            path: "/_ping".to_string(),
            ..Default::default()
        });
        assert_eq!(wire, "GET /_ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    }

    #[test]
    fn test_write_request_sized_body() {
        let wire = render(Request {
            method: Method::Post,
            path: "/containers/create".to_string(),
            query: vec![("name".to_string(), "db".to_string())],
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(RequestBody::Bytes(b"{}".to_vec())),
        });
        assert!(wire.starts_with("POST /containers/create?name=db HTTP/1.1\r\n"));
        assert!(wire.contains("Content-Type: application/json\r\n"));
        assert!(wire.ends_with("Content-Length: 2\r\n\r\n{}"));
    }

    #[test]
    fn test_write_request_text_body_sent_as_bytes() {
        let wire = render(Request {
            method: Method::Put,
            path: "/x".to_string(),
            body: Some(RequestBody::Text("héllo".to_string())),
            ..Default::default()
        });
        assert!(wire.ends_with("Content-Length: 6\r\n\r\nhéllo"));
    }

    #[test]
    fn test_write_request_streams_chunked() {
        let wire = render(Request {
            method: Method::Post,
            path: "/build".to_string(),
            body: Some(RequestBody::Stream(Box::new(Cursor::new(b"tarball".to_vec())))),
            ..Default::default()
        });
        assert!(wire.contains("Transfer-Encoding: chunked\r\n\r\n"));
        assert!(wire.ends_with("7\r\ntarball\r\n0\r\n\r\n"));
    }

    #[test]
    fn test_write_request_keeps_caller_headers() {
        let wire = render(Request {
            headers: vec![
                ("host".to_string(), "daemon".to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
            ],
            ..Default::default()
        });
        assert!(!wire.contains("Host: localhost"));
        assert!(!wire.contains("Connection: close"));
        assert!(wire.contains("host: daemon\r\n"));
    }

    #[test]
    fn test_write_request_rejects_header_injection() {
        let mut out = Vec::new();
        let err = write_request(
            &mut out,
            Request {
                path: "/info".to_string(),
                headers: vec![("X-Note".to_string(), "a\r\nX-Injected: 1".to_string())],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_request_caller_transfer_encoding_not_repeated() {
        let wire = render(Request {
            method: Method::Post,
            path: "/build".to_string(),
            headers: vec![("transfer-encoding".to_string(), "chunked".to_string())],
            body: Some(RequestBody::Stream(Box::new(Cursor::new(b"tarball".to_vec())))),
            ..Default::default()
        });
        assert_eq!(wire.to_ascii_lowercase().matches("transfer-encoding").count(), 1);
        assert!(wire.contains("transfer-encoding: chunked\r\nConnection: close\r\n\r\n7\r\n"));
        assert!(wire.ends_with("7\r\ntarball\r\n0\r\n\r\n"));
    }

    #[test]
    fn test_unix_connect_failure_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = UnixSocketTransport::new(dir.path().join("missing.sock"));
        let err = transport.execute(Request::default()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
