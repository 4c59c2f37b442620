// src/error.rs

//! Crate-wide error type

use std::io;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the daemon transport and the environment builder
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or connection failure, including end-of-stream inside headers
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response does not start with a supported protocol marker
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Chunked body framing violation
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// Recipe content type, parse, structural or ordering failure
    #[error("{0}")]
    Validation(String),

    /// Unusable configuration (endpoint, TLS material, config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Daemon answered with a non-success status
    #[error("Daemon returned {status}: {message}")]
    Api { status: i32, message: String },

    /// Local file I/O
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Recover a crate error from an I/O error raised inside a `Read` impl.
    ///
    /// Body readers can only report `std::io::Error`, so framing failures are
    /// smuggled through as the inner error. Anything else on the wire is a
    /// transport failure.
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Transport(err.to_string());
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Transport(other.to_string()),
            None => Error::Transport("I/O error without payload".to_string()),
        }
    }

    /// Wrap this error for use inside a `Read` implementation
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            Error::Transport(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, self)
    }

    /// True for validation failures (recipe problems the user can fix)
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
