// src/daemon/client.rs

//! Typed daemon calls
//!
//! # Example
//!
//! ```ignore
//! use berth::daemon::{DaemonClient, DaemonConfig};
//!
//! let client = DaemonClient::new(&DaemonConfig::default())?;
//! client.ping()?;
//! let id = client.create_container("db", &serde_json::json!({ "Image": "postgres:16" }))?;
//! client.start_container(&id)?;
//! ```

use super::connection::{DaemonConnection, Method};
use super::response::DaemonResponse;
use super::transport::{Transport, transport_for};
use super::DaemonConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

/// Daemon version report (`GET /version`)
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DaemonVersion {
    pub version: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

/// Response from creating a container
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

/// Error body the daemon sends with non-success statuses
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Client for a container engine daemon
#[derive(Clone)]
pub struct DaemonClient {
    transport: Arc<dyn Transport>,
}

impl DaemonClient {
    /// Connect using the configured endpoint
    pub fn new(config: &DaemonConfig) -> Result<Self> {
        Ok(Self {
            transport: transport_for(config)?,
        })
    }

    /// Use an existing transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Start building a raw request
    pub fn connection(&self) -> DaemonConnection {
        DaemonConnection::open(Arc::clone(&self.transport))
    }

    /// Check that the daemon answers (`GET /_ping`)
    pub fn ping(&self) -> Result<()> {
        let mut response = self.connection().path("/_ping").execute()?;
        let status = response.status()?;
        if status == 200 {
            response.close();
            Ok(())
        } else {
            Err(api_error(status, &mut response))
        }
    }

    /// Daemon version information (`GET /version`)
    pub fn version(&self) -> Result<DaemonVersion> {
        let response = self.connection().path("/version").execute()?;
        parse_response(response)
    }

    /// Create a container, returning its id
    pub fn create_container(&self, name: &str, config: &serde_json::Value) -> Result<String> {
        let response = self
            .connection()
            .method(Method::Post)
            .path("/containers/create")
            .query("name", name)
            .json(config)?
            .execute()?;
        let created: CreateContainerResponse = parse_response(response)?;
        for warning in created.warnings.iter().flatten() {
            tracing::warn!("Daemon warning for container {}: {}", name, warning);
        }
        info!("Created container {} ({})", name, created.id);
        Ok(created.id)
    }

    /// Start a created container. Already running is not an error.
    pub fn start_container(&self, id: &str) -> Result<()> {
        let mut response = self
            .connection()
            .method(Method::Post)
            .path(format!("/containers/{}/start", id))
            .execute()?;
        match response.status()? {
            204 | 304 => {
                response.close();
                debug!("Started container {}", id);
                Ok(())
            }
            status => Err(api_error(status, &mut response)),
        }
    }

    /// Raw inspect document for a container
    pub fn inspect_container(&self, id: &str) -> Result<serde_json::Value> {
        let response = self
            .connection()
            .path(format!("/containers/{}/json", id))
            .execute()?;
        parse_response(response)
    }
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient")
            .field("transport", &self.transport.describe())
            .finish()
    }
}

/// Decode a JSON body from a 2xx response
fn parse_response<T: DeserializeOwned>(mut response: DaemonResponse) -> Result<T> {
    let status = response.status()?;
    if !(200..300).contains(&status) {
        return Err(api_error(status, &mut response));
    }
    let body = response.bytes()?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::Transport(format!("Failed to parse daemon response: {}", e)))
}

/// Turn a non-success response into an error, preferring the daemon's message
fn api_error(status: i32, response: &mut DaemonResponse) -> Error {
    let body = match response.text() {
        Ok(body) => body,
        Err(e) => return e,
    };
    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(error) => error.message,
        Err(_) => body.trim().to_string(),
    };
    Error::Api { status, message }
}
