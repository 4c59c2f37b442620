// src/daemon/response.rs

//! Daemon responses
//!
//! A [`DaemonResponse`] looks the same whichever transport produced it. On
//! the Unix-socket path it wraps the raw socket and parses the status line
//! and headers itself, lazily, on first use of any accessor. On the TCP path
//! the HTTP client has already done the framing and the head is known up
//! front.
//!
//! Body selection for raw streams:
//!
//! | Headers                              | Body                      |
//! |--------------------------------------|---------------------------|
//! | HEAD request, 1xx, 204 or 304        | empty                     |
//! | `Content-Length: 0`                  | empty                     |
//! | `Content-Length: N`                  | [`BoundedBodyReader`]     |
//! | `Transfer-Encoding: chunked`         | [`ChunkedBodyDecoder`]    |
//! | neither                              | raw stream, unbounded     |

use super::body::{BodyStream, BoundedBodyReader, CloseOnExhaust, ConnectionRelease};
use super::chunked::ChunkedBodyDecoder;
use crate::error::{Error, Result};
use std::io::{self, Read};
use tracing::debug;

/// Length of the protocol marker at the start of every response
const VERSION_MARKER_LEN: usize = 8;

/// Protocol markers this client understands
const SUPPORTED_VERSIONS: [&[u8]; 2] = [b"HTTP/1.1", b"HTTP/1.0"];

/// Upper bound on a single header line
const MAX_HEADER_LINE: usize = 64 * 1024;

/// Status line and header block of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Full status line, e.g. `HTTP/1.1 200 OK`
    status_line: String,
    /// Header lines exactly as received, e.g. `Content-Type: text/plain`
    headers: Vec<String>,
}

impl ResponseHead {
    pub fn new(status_line: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            status_line: status_line.into(),
            headers,
        }
    }

    /// Parse the status line and header block from a raw stream.
    ///
    /// Stops right after the empty line that ends the header block, leaving
    /// the body in `reader`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut marker = [0u8; VERSION_MARKER_LEN];
        let mut filled = 0;
        while filled < VERSION_MARKER_LEN {
            match reader.read(&mut marker[filled..]) {
                Ok(0) => {
                    return Err(Error::Transport(
                        "unexpected end of stream while reading status line".to_string(),
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_io(e)),
            }
        }
        if !SUPPORTED_VERSIONS.iter().any(|version| *version == &marker[..]) {
            return Err(Error::MalformedResponse(format!(
                "unsupported protocol marker '{}'",
                String::from_utf8_lossy(&marker)
            )));
        }

        let mut status_line = String::from_utf8_lossy(&marker).into_owned();
        status_line.push_str(&read_line(reader)?);

        let mut headers = Vec::new();
        loop {
            let line = read_line(reader)?;
            if line.is_empty() {
                break;
            }
            headers.push(line);
        }

        debug!(status_line = %status_line, headers = headers.len(), "parsed response head");
        Ok(Self {
            status_line,
            headers,
        })
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Numeric status code, or `-1` when the status line does not carry one
    pub fn status_code(&self) -> i32 {
        let rest = self.status_line.get(VERSION_MARKER_LEN..).unwrap_or("");
        let Some(start) = rest.find(' ') else {
            return -1;
        };
        let token = &rest[start + 1..];
        let token = match token.find(' ') {
            Some(end) => &token[..end],
            None => token,
        };
        token.trim().parse().unwrap_or(-1)
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).next()
    }

    /// All values of a header, in the order received
    pub fn headers(&self, name: &str) -> Vec<String> {
        self.header_values(name).collect()
    }

    /// Every header line, verbatim
    pub fn raw_headers(&self) -> &[String] {
        &self.headers
    }

    fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = String> + 'a {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.headers.iter().filter_map(move |line| {
            let head = line.get(..prefix.len())?;
            if head.eq_ignore_ascii_case(&prefix) {
                Some(line[prefix.len()..].trim().to_string())
            } else {
                None
            }
        })
    }

    /// `Content-Length`, or `-1` when absent or unparseable
    pub fn content_length(&self) -> i64 {
        self.header("Content-Length")
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|length| *length >= 0)
            .unwrap_or(-1)
    }

    pub fn content_type(&self) -> Option<String> {
        self.header("Content-Type")
    }

    /// True when the status forbids a message body (1xx, 204, 304)
    pub fn is_bodyless_status(&self) -> bool {
        matches!(self.status_code(), 100..=199 | 204 | 304)
    }

    /// True when the body uses chunked transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
    }
}

/// Read one line terminated by `\n`, dropping the terminator and a trailing `\r`
fn read_line<R: Read>(reader: &mut R) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(Error::Transport(
                    "unexpected end of stream while reading headers".to_string(),
                ));
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if line.len() >= MAX_HEADER_LINE {
                    return Err(Error::MalformedResponse(
                        "header line exceeds 64 KiB".to_string(),
                    ));
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from_io(e)),
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Pick the body reader the headers call for
fn select_body(
    head: &ResponseHead,
    head_request: bool,
    raw: Box<dyn Read + Send>,
) -> Box<dyn Read + Send> {
    if head_request || head.is_bodyless_status() {
        debug!("no body expected");
        return Box::new(io::empty());
    }
    match head.content_length() {
        0 => {
            debug!("empty body (Content-Length: 0)");
            Box::new(io::empty())
        }
        length if length > 0 => {
            debug!(length, "bounded body");
            Box::new(BoundedBodyReader::new(raw, length as u64))
        }
        _ if head.is_chunked() => {
            debug!("chunked body");
            Box::new(ChunkedBodyDecoder::new(raw))
        }
        _ => {
            debug!("unbounded body");
            raw
        }
    }
}

enum Source {
    /// Raw byte stream, head not parsed yet
    Raw {
        reader: Box<dyn Read + Send>,
        release: ConnectionRelease,
    },
    /// Raw byte stream whose head has been parsed
    RawParsed {
        reader: Box<dyn Read + Send>,
        release: ConnectionRelease,
    },
    /// Framing already handled by an HTTP client
    Framed {
        reader: Box<dyn Read + Send>,
        release: ConnectionRelease,
    },
    /// Body handed out, or the response was closed
    Consumed,
}

/// Response to a single daemon request.
///
/// Owns the connection it was read from. The connection is released when the
/// body reaches end-of-stream, when [`DaemonResponse::close`] is called, or
/// when the response is dropped.
pub struct DaemonResponse {
    source: Source,
    head: Option<ResponseHead>,
    body: Option<BodyStream>,
    head_request: bool,
}

impl DaemonResponse {
    /// Wrap a raw byte stream; the head is parsed on first access
    pub fn from_raw<R>(reader: R, release: ConnectionRelease) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            source: Source::Raw {
                reader: Box::new(reader),
                release,
            },
            head: None,
            body: None,
            head_request: false,
        }
    }

    /// Wrap a response whose head is already known and whose body reader
    /// is already de-framed
    pub fn from_parts<R>(head: ResponseHead, body: R, release: ConnectionRelease) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            source: Source::Framed {
                reader: Box::new(body),
                release,
            },
            head: Some(head),
            body: None,
            head_request: false,
        }
    }

    /// Mark this as the answer to a HEAD request, which never carries a body
    /// whatever its `Content-Length` says
    pub fn for_head_request(mut self) -> Self {
        self.head_request = true;
        self
    }

    /// Parsed status line and headers
    pub fn head(&mut self) -> Result<&ResponseHead> {
        if self.head.is_none() {
            match std::mem::replace(&mut self.source, Source::Consumed) {
                Source::Raw {
                    mut reader,
                    mut release,
                } => match ResponseHead::read_from(&mut reader) {
                    Ok(head) => {
                        self.head = Some(head);
                        self.source = Source::RawParsed { reader, release };
                    }
                    Err(e) => {
                        drop(reader);
                        release.release();
                        return Err(e);
                    }
                },
                _ => {
                    return Err(Error::Transport(
                        "response was closed before its headers were read".to_string(),
                    ));
                }
            }
        }
        match self.head.as_ref() {
            Some(head) => Ok(head),
            None => Err(Error::Transport("response headers unavailable".to_string())),
        }
    }

    /// Status code, `-1` when the status line does not carry a number
    pub fn status(&mut self) -> Result<i32> {
        Ok(self.head()?.status_code())
    }

    /// `Content-Length`, `-1` when absent or unparseable
    pub fn content_length(&mut self) -> Result<i64> {
        Ok(self.head()?.content_length())
    }

    pub fn content_type(&mut self) -> Result<Option<String>> {
        Ok(self.head()?.content_type())
    }

    pub fn header(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.head()?.header(name))
    }

    pub fn headers(&mut self, name: &str) -> Result<Vec<String>> {
        Ok(self.head()?.headers(name))
    }

    /// Body stream, created on first call and cached afterwards
    pub fn body(&mut self) -> Result<&mut BodyStream> {
        if self.body.is_none() {
            self.head()?;
            let body = match std::mem::replace(&mut self.source, Source::Consumed) {
                Source::RawParsed { reader, release } => {
                    let head = self.head.as_ref().ok_or_else(|| {
                        Error::Transport("response headers unavailable".to_string())
                    })?;
                    CloseOnExhaust::new(select_body(head, self.head_request, reader), release)
                }
                Source::Framed { reader, release } => CloseOnExhaust::new(reader, release),
                Source::Raw { .. } | Source::Consumed => {
                    return Err(Error::Transport(
                        "response body is no longer available".to_string(),
                    ));
                }
            };
            self.body = Some(body);
        }
        match self.body.as_mut() {
            Some(body) => Ok(body),
            None => Err(Error::Transport("response body unavailable".to_string())),
        }
    }

    /// Take ownership of the body stream
    pub fn into_body(mut self) -> Result<BodyStream> {
        self.body()?;
        self.body
            .take()
            .ok_or_else(|| Error::Transport("response body unavailable".to_string()))
    }

    /// Read the whole body
    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.body()?.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }

    /// Read the whole body as UTF-8 text (lossy)
    pub fn text(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Release the connection without reading the rest of the body. Idempotent.
    pub fn close(&mut self) {
        if let Some(body) = self.body.as_mut() {
            body.close();
        }
        match std::mem::replace(&mut self.source, Source::Consumed) {
            Source::Raw { reader, mut release }
            | Source::RawParsed { reader, mut release }
            | Source::Framed { reader, mut release } => {
                drop(reader);
                release.release();
            }
            Source::Consumed => {}
        }
    }
}

impl std::fmt::Debug for DaemonResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonResponse")
            .field("head", &self.head)
            .field("body", &self.body)
            .finish()
    }
}
