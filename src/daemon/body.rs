// src/daemon/body.rs

//! Response body stream wrappers

use crate::error::Error;
use std::fmt;
use std::io::{self, Read};

/// Reader that reports end-of-stream after exactly `length` bytes.
///
/// Bytes past the limit stay in the underlying stream.
pub struct BoundedBodyReader<R> {
    inner: R,
    length: u64,
    remaining: u64,
}

impl<R: Read> BoundedBodyReader<R> {
    pub fn new(inner: R, length: u64) -> Self {
        Self {
            inner,
            length,
            remaining: length,
        }
    }

    /// Bytes still to be delivered
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for BoundedBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..want])?;
        if read == 0 {
            return Err(Error::Transport(format!(
                "stream ended after {} of {} body bytes",
                self.length - self.remaining,
                self.length
            ))
            .into_io());
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

/// One-shot hook that releases a connection.
///
/// Fires on the first call to [`ConnectionRelease::release`] or on drop,
/// whichever comes first.
pub struct ConnectionRelease(Option<Box<dyn FnOnce() + Send>>);

impl ConnectionRelease {
    pub fn new<F>(hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(hook)))
    }

    /// Release hook for connections that clean up on drop
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn release(&mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}

impl Drop for ConnectionRelease {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ConnectionRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionRelease")
            .field(&self.0.is_some())
            .finish()
    }
}

/// Body stream that releases its connection exactly once.
///
/// The release runs on the first of: natural end-of-stream, an explicit
/// [`CloseOnExhaust::close`], or drop. Later calls are no-ops and reads after
/// close report end-of-stream.
pub struct CloseOnExhaust<R> {
    // Dropped before `release` so the reader lets go of the socket first
    inner: Option<R>,
    release: ConnectionRelease,
    closed: bool,
}

impl<R: Read> CloseOnExhaust<R> {
    pub fn new(inner: R, release: ConnectionRelease) -> Self {
        Self {
            inner: Some(inner),
            release,
            closed: false,
        }
    }

    /// Release the underlying connection. Idempotent.
    pub fn close(&mut self) {
        self.inner.take();
        self.release.release();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<R: Read> Read for CloseOnExhaust<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(0);
        };
        let read = inner.read(buf)?;
        if read == 0 && !buf.is_empty() {
            self.close();
        }
        Ok(read)
    }
}

impl<R> fmt::Debug for CloseOnExhaust<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseOnExhaust")
            .field("closed", &self.closed)
            .finish()
    }
}

/// Type-erased body handed to callers
pub type BodyStream = CloseOnExhaust<Box<dyn Read + Send>>;
