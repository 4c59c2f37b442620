// src/daemon/connection.rs

//! Single-use request builder
//!
//! ```ignore
//! let mut response = DaemonConnection::open(transport)
//!     .method(Method::Post)
//!     .path("/containers/create")
//!     .query("name", "db")
//!     .json(&config)?
//!     .execute()?;
//! ```

use super::response::DaemonResponse;
use super::transport::Transport;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::Config(format!("Unsupported request method: {}", other))),
        }
    }
}

/// Request entity
pub enum RequestBody {
    /// Streamed body of unknown length
    Stream(Box<dyn Read + Send>),
    /// Body held in memory
    Bytes(Vec<u8>),
    /// Legacy text body, sent as its UTF-8 bytes. Prefer `Bytes`.
    Text(String),
}

impl RequestBody {
    /// Length when known without reading the body
    pub fn known_length(&self) -> Option<usize> {
        match self {
            RequestBody::Stream(_) => None,
            RequestBody::Bytes(bytes) => Some(bytes.len()),
            RequestBody::Text(text) => Some(text.len()),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Text(text) => write!(f, "Text({} bytes)", text.len()),
        }
    }
}

/// A fully built request, ready for a transport
#[derive(Debug, Default)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Query parameters, sent as `name=value` pairs joined with `&`
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl Request {
    /// Path plus query string. Values are not escaped here.
    pub fn target(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        if self.query.is_empty() {
            return path.to_string();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}?{}", path, query.join("&"))
    }

    /// Whether the caller already set a header (case-insensitive)
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Reject header names and values that would break the header block.
    ///
    /// Names must be non-empty and free of `:` and whitespace; neither part
    /// may contain CR, LF or NUL.
    pub fn check_headers(&self) -> Result<()> {
        let breaks_line = |c: char| matches!(c, '\r' | '\n' | '\0');
        for (name, value) in &self.headers {
            if name.is_empty()
                || name.contains(|c: char| breaks_line(c) || c == ':' || c.is_whitespace())
            {
                return Err(Error::Config(format!("Invalid header name {:?}", name)));
            }
            if value.contains(breaks_line) {
                return Err(Error::Config(format!(
                    "Invalid value for header '{}': {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Builder for one request against the daemon.
///
/// `execute` consumes the connection, so each one runs exactly once.
pub struct DaemonConnection {
    transport: Arc<dyn Transport>,
    request: Request,
}

impl DaemonConnection {
    pub fn open(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request: Request {
                path: "/".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.request.path = path.into();
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.request.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request entity, replacing any earlier one
    pub fn entity(mut self, body: RequestBody) -> Self {
        self.request.body = Some(body);
        self
    }

    /// Serialize `value` as the JSON entity
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::Config(format!("Failed to encode request body: {e}")))?;
        Ok(self
            .header("Content-Type", "application/json")
            .entity(RequestBody::Bytes(bytes)))
    }

    /// The request as built so far
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Send the request and return the response
    pub fn execute(self) -> Result<DaemonResponse> {
        debug!(
            method = %self.request.method,
            target = %self.request.target(),
            transport = %self.transport.describe(),
            "executing daemon request"
        );
        self.transport.execute(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_with_query() {
        let request = Request {
            path: "/containers/json".to_string(),
            query: vec![
                ("all".to_string(), "1".to_string()),
                ("filters".to_string(), "{\"name\":[\"db\"]}".to_string()),
            ],
            ..Default::default()
        };
        assert_eq!(request.target(), "/containers/json?all=1&filters={\"name\":[\"db\"]}");
    }

    #[test]
    fn test_target_defaults_to_root() {
        assert_eq!(Request::default().target(), "/");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        assert!("PATCHY".parse::<Method>().is_err());
    }

    #[test]
    fn test_known_length() {
        assert_eq!(RequestBody::Bytes(vec![1, 2, 3]).known_length(), Some(3));
        assert_eq!(RequestBody::Text("héllo".to_string()).known_length(), Some(6));
        assert_eq!(RequestBody::Stream(Box::new(std::io::empty())).known_length(), None);
    }

    #[test]
    fn test_check_headers_rejects_line_breaks() {
        let request = |name: &str, value: &str| Request {
            headers: vec![(name.to_string(), value.to_string())],
            ..Default::default()
        };
        assert!(request("X-Registry-Auth", "token").check_headers().is_ok());
        for (name, value) in [
            ("X-Evil", "a\r\nInjected: yes"),
            ("X-Evil", "a\nb"),
            ("Bad\r\nName", "v"),
            ("Bad Name", "v"),
            ("Bad:Name", "v"),
            ("", "v"),
        ] {
            let err = request(name, value).check_headers().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{name:?}: {err:?}");
        }
    }

    #[test]
    fn test_has_header_is_case_insensitive() {
        let request = Request {
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            ..Default::default()
        };
        assert!(request.has_header("Content-Type"));
        assert!(!request.has_header("Host"));
    }
}
