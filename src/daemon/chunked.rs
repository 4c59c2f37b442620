// src/daemon/chunked.rs

//! Chunked transfer encoding
//!
//! `ChunkedBodyDecoder` turns a `Transfer-Encoding: chunked` body back into a
//! flat byte stream. It reads straight from the shared response stream, so
//! it never consumes bytes past the terminal chunk-size line.
//!
//! `ChunkedBodyEncoder` produces the same framing for request bodies whose
//! length is not known up front.
//!
//! ```text
//! 5\r\nhello\r\n      SIZE -> DATA -> CRLF
//! 0\r\n               SIZE -> DONE
//! ```

use crate::error::Error;
use std::io::{self, Read, Write};
use tracing::debug;

/// Upper bound on a chunk-size line, extensions included
const MAX_SIZE_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Waiting for the next chunk-size line
    Size,
    /// Delivering bytes of the current chunk
    Data,
    /// Current chunk fully delivered, CRLF not yet consumed
    Terminator,
    /// Zero-size chunk seen
    Done,
}

/// Decoder for a chunked body
pub struct ChunkedBodyDecoder<R> {
    inner: R,
    state: ChunkState,
    /// Declared size of the current chunk
    chunk_size: u64,
    /// Bytes of the current chunk already handed to the caller
    consumed: u64,
}

impl<R: Read> ChunkedBodyDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: ChunkState::Size,
            chunk_size: 0,
            consumed: 0,
        }
    }

    /// Bytes left in the chunk currently being delivered.
    ///
    /// This does not look ahead into chunks that have not been announced yet.
    pub fn available(&self) -> usize {
        match self.state {
            ChunkState::Data => {
                usize::try_from(self.chunk_size - self.consumed).unwrap_or(usize::MAX)
            }
            _ => 0,
        }
    }

    /// True once the terminal zero-size chunk has been read
    pub fn is_finished(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn read_size_line(&mut self) -> io::Result<u64> {
        let mut line = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b'\n') => break,
                Some(byte) => {
                    if line.len() >= MAX_SIZE_LINE {
                        return Err(malformed("chunk size line exceeds 4096 bytes".to_string()));
                    }
                    line.push(byte);
                }
                None => {
                    return Err(malformed(
                        "unexpected end of stream while reading chunk size".to_string(),
                    ));
                }
            }
        }
        parse_chunk_size(&line).map_err(Error::into_io)
    }

    fn read_terminator(&mut self) -> io::Result<()> {
        let cr = self.read_byte()?;
        let lf = self.read_byte()?;
        if cr != Some(b'\r') || lf != Some(b'\n') {
            return Err(malformed(format!(
                "chunk of {} bytes is not followed by CRLF",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for ChunkedBodyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                ChunkState::Done => return Ok(0),
                ChunkState::Size => {
                    let size = self.read_size_line()?;
                    debug!(size, "chunk size line");
                    self.chunk_size = size;
                    self.consumed = 0;
                    if size == 0 {
                        self.state = ChunkState::Done;
                        return Ok(0);
                    }
                    self.state = ChunkState::Data;
                }
                ChunkState::Terminator => {
                    self.read_terminator()?;
                    self.state = ChunkState::Size;
                }
                ChunkState::Data => {
                    let remaining = self.chunk_size - self.consumed;
                    let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    let read = self.inner.read(&mut buf[..want])?;
                    if read == 0 {
                        return Err(malformed(format!(
                            "stream ended with {} bytes of the current chunk outstanding",
                            remaining
                        )));
                    }
                    self.consumed += read as u64;
                    if self.consumed == self.chunk_size {
                        self.state = ChunkState::Terminator;
                    }
                    return Ok(read);
                }
            }
        }
    }
}

/// Parse the leading hex digits of a chunk-size line.
///
/// Anything after the digits (chunk extensions, the trailing `\r`) is ignored.
fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    let digits = line.iter().take_while(|b| b.is_ascii_hexdigit()).count();
    let text = String::from_utf8_lossy(&line[..digits]);
    if digits == 0 {
        return Err(Error::MalformedChunk(format!(
            "invalid chunk size line '{}'",
            String::from_utf8_lossy(line).trim_end()
        )));
    }
    u64::from_str_radix(&text, 16)
        .map_err(|_| Error::MalformedChunk(format!("chunk size '{}' is out of range", text)))
}

fn malformed(message: String) -> io::Error {
    Error::MalformedChunk(message).into_io()
}

/// Writer that frames everything written to it as chunks.
///
/// Call [`ChunkedBodyEncoder::finish`] to emit the terminal chunk; dropping
/// the encoder leaves the body unterminated.
pub struct ChunkedBodyEncoder<W: Write> {
    inner: W,
}

impl<W: Write> ChunkedBodyEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write the terminal chunk and return the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"0\r\n\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedBodyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // An empty chunk would terminate the body
        if buf.is_empty() {
            return Ok(0);
        }
        write!(self.inner, "{:x}\r\n", buf.len())?;
        self.inner.write_all(buf)?;
        self.inner.write_all(b"\r\n")?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(raw: &[u8]) -> crate::Result<Vec<u8>> {
        let mut decoder = ChunkedBodyDecoder::new(Cursor::new(raw.to_vec()));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(Error::from_io)?;
        Ok(out)
    }

    #[test]
    fn test_decode_multiple_chunks() {
        let body = decode(b"4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n").unwrap();
        assert_eq!(body, b"Wikipedia in\r\n\r\nchunks.");
    }

    #[test]
    fn test_single_chunk_round_trip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut framed = format!("{:x}\r\n", payload.len()).into_bytes();
        framed.extend_from_slice(&payload);
        framed.extend_from_slice(b"\r\n0\r\n\r\n");

        assert_eq!(decode(&framed).unwrap(), payload);
    }

    #[test]
    fn test_chunk_extension_ignored() {
        let body = decode(b"3;name=value\r\nabc\r\n0\r\n\r\n").unwrap();
        assert_eq!(body, b"abc");
    }

    #[test]
    fn test_uppercase_hex_size() {
        let body = decode(b"A\r\n0123456789\r\n0\r\n").unwrap();
        assert_eq!(body, b"0123456789");
    }

    #[test]
    fn test_short_chunk_before_terminator_is_malformed() {
        let err = decode(b"3\r\nab\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)), "got {err:?}");
    }

    #[test]
    fn test_truncated_chunk_is_malformed() {
        let err = decode(b"a\r\nabc").unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)), "got {err:?}");
    }

    #[test]
    fn test_invalid_size_is_malformed() {
        let err = decode(b"zz\r\nabc\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_size_line_end_is_malformed() {
        let err = decode(b"5").unwrap_err();
        assert!(matches!(err, Error::MalformedChunk(_)), "got {err:?}");
    }

    #[test]
    fn test_terminal_chunk_leaves_rest_of_stream() {
        let mut decoder = ChunkedBodyDecoder::new(Cursor::new(b"2\r\nok\r\n0\r\nNEXT".to_vec()));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ok");
        assert!(decoder.is_finished());

        // Reads after the terminal chunk keep reporting end-of-stream
        let mut buf = [0u8; 8];
        assert_eq!(decoder.read(&mut buf).unwrap(), 0);

        let mut rest = String::new();
        decoder.into_inner().read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "NEXT");
    }

    #[test]
    fn test_available_reports_current_chunk_only() {
        let mut decoder =
            ChunkedBodyDecoder::new(Cursor::new(b"6\r\nabcdef\r\n4\r\nghij\r\n0\r\n\r\n".to_vec()));
        assert_eq!(decoder.available(), 0);

        let mut buf = [0u8; 2];
        decoder.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
        assert_eq!(decoder.available(), 4);

        let mut rest = [0u8; 4];
        decoder.read_exact(&mut rest).unwrap();
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_encoder_framing() {
        let mut encoder = ChunkedBodyEncoder::new(Vec::new());
        encoder.write_all(b"hello").unwrap();
        encoder.write_all(b"").unwrap();
        encoder.write_all(b" world, this is long").unwrap();
        let framed = encoder.finish().unwrap();

        assert_eq!(framed, b"5\r\nhello\r\n14\r\n world, this is long\r\n0\r\n\r\n");
        assert_eq!(decode(&framed).unwrap(), b"hello world, this is long");
    }
}
