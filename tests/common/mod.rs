// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// Stream a canned daemon can serve on
trait CannedStream: Read + Write {
    fn set_wait(&self) -> std::io::Result<()>;
    fn shutdown_write(&self) -> std::io::Result<()>;
}

impl CannedStream for UnixStream {
    fn set_wait(&self) -> std::io::Result<()> {
        self.set_read_timeout(Some(WAIT))
    }

    fn shutdown_write(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl CannedStream for TcpStream {
    fn set_wait(&self) -> std::io::Result<()> {
        self.set_read_timeout(Some(WAIT))
    }

    fn shutdown_write(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// A fake daemon that answers each connection with the next canned
/// response, on a Unix socket or on a loopback TCP port.
///
/// Keep the value alive for the duration of the test; a Unix socket lives in
/// a temporary directory that is removed on drop.
pub struct CannedDaemon {
    _dir: Option<TempDir>,
    endpoint: String,
    requests: Receiver<String>,
    released: Receiver<bool>,
}

impl CannedDaemon {
    /// Serve on a Unix socket in a fresh temp directory
    pub fn start(responses: Vec<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let endpoint = format!("unix://{}", socket.display());
        Self::spawn(Some(dir), endpoint, responses, move || {
            listener.accept().map(|(stream, _)| stream)
        })
    }

    /// Serve on an ephemeral loopback TCP port
    pub fn start_tcp(responses: Vec<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("tcp://{}", listener.local_addr().unwrap());
        Self::spawn(None, endpoint, responses, move || {
            listener.accept().map(|(stream, _)| stream)
        })
    }

    fn spawn<S, A>(
        dir: Option<TempDir>,
        endpoint: String,
        responses: Vec<&str>,
        accept: A,
    ) -> Self
    where
        S: CannedStream,
        A: Fn() -> std::io::Result<S> + Send + 'static,
    {
        let responses: Vec<Vec<u8>> = responses
            .into_iter()
            .map(|r| r.as_bytes().to_vec())
            .collect();
        let (request_tx, requests) = mpsc::channel();
        let (released_tx, released) = mpsc::channel();

        thread::spawn(move || {
            for response in responses {
                let Ok(stream) = accept() else {
                    return;
                };
                serve(stream, &response, &request_tx, &released_tx);
            }
        });

        Self {
            _dir: dir,
            endpoint,
            requests,
            released,
        }
    }

    /// Endpoint URI for this daemon
    pub fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    /// Raw text of the next request received
    pub fn next_request(&self) -> String {
        self.requests.recv_timeout(WAIT).expect("no request received")
    }

    /// True once the client has closed its end of the next connection
    pub fn connection_released(&self) -> bool {
        self.released.recv_timeout(WAIT).unwrap_or(false)
    }
}

fn serve<S: CannedStream>(
    mut stream: S,
    response: &[u8],
    requests: &Sender<String>,
    released: &Sender<bool>,
) {
    stream.set_wait().unwrap();
    let request = read_request(&mut stream);
    let _ = requests.send(request);

    let _ = stream.write_all(response);
    let _ = stream.flush();
    // Responses without framing end at end-of-stream
    let _ = stream.shutdown_write();

    let mut sink = [0u8; 256];
    let closed = loop {
        match stream.read(&mut sink) {
            Ok(0) => break true,
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break true,
            Err(_) => break false,
        }
    };
    let _ = released.send(closed);
}

/// Read the head plus a Content-Length or chunked body
fn read_request<S: Read>(stream: &mut S) -> String {
    let mut data = Vec::new();
    let mut byte = [0u8; 1];
    while !data.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(1) => data.push(byte[0]),
            _ => return String::from_utf8_lossy(&data).into_owned(),
        }
    }

    let head = String::from_utf8_lossy(&data).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok());

    if let Some(length) = length {
        let mut body = vec![0u8; length];
        if stream.read_exact(&mut body).is_ok() {
            data.extend_from_slice(&body);
        }
    } else if head.contains("transfer-encoding: chunked") {
        let head_len = data.len();
        while !(data.len() > head_len && data.ends_with(b"0\r\n\r\n")) {
            match stream.read(&mut byte) {
                Ok(1) => data.push(byte[0]),
                _ => break,
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// Two-service recipe where `web` links to `db`
pub const WEB_DB_RECIPE: &str = r#"
version: "3"
services:
  web:
    image: nginx:1.25
    links:
      - db:database
    mem_limit: 512m
  db:
    image: postgres:16
    expose:
      - "5432"
"#;

/// Write `content` to a recipe file in a fresh temp directory
pub fn write_recipe(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
