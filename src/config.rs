// src/config.rs
//! Configuration file parsing for berth
//!
//! Supports a TOML configuration file with the following sections:
//! - [daemon] - Endpoint and timeouts
//! - [daemon.tls] - CA bundle and client certificate for TCP endpoints
//! - [environment] - Defaults applied while building environments
//!
//! Lookup order: an explicit `--config` path, then
//! `<config dir>/berth/config.toml`, then built-in defaults. `DOCKER_HOST`
//! overrides the configured endpoint and `--endpoint` overrides both.

use crate::daemon::{DaemonConfig, DaemonEndpoint, TlsConfig, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_MS};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct BerthConfig {
    /// Daemon connection settings
    #[serde(default)]
    pub daemon: DaemonSection,

    /// Environment build settings
    #[serde(default)]
    pub environment: EnvironmentSection,
}

/// Daemon configuration section
#[derive(Debug, Deserialize)]
pub struct DaemonSection {
    /// `unix:///path`, `tcp://host:port`, `http://...` or `https://...`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    /// TLS material; its presence turns `tcp://` into `https://`
    #[serde(default)]
    pub tls: Option<TlsSection>,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            tls: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// TLS configuration section
#[derive(Debug, Default, Deserialize)]
pub struct TlsSection {
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

/// Environment configuration section
#[derive(Debug, Default, Deserialize)]
pub struct EnvironmentSection {
    /// Memory limit for services that declare none (e.g. "2GB")
    #[serde(default)]
    pub default_memory_limit: Option<String>,
}

impl BerthConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: BerthConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("berth").join("config.toml"))
    }

    /// Load the explicit file if given, else the per-user file if it exists,
    /// else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!("Using config file {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Replace the endpoint when an override is present
    pub fn override_endpoint(&mut self, endpoint: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            debug!("Daemon endpoint overridden: {}", endpoint);
            self.daemon.endpoint = endpoint;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.daemon.connect_timeout_ms == 0 {
            anyhow::bail!("daemon.connect_timeout_ms must be greater than 0");
        }
        if self.daemon.read_timeout_ms == 0 {
            anyhow::bail!("daemon.read_timeout_ms must be greater than 0");
        }

        DaemonEndpoint::parse(&self.daemon.endpoint, self.daemon.tls.is_some())
            .with_context(|| format!("Invalid daemon.endpoint: {}", self.daemon.endpoint))?;

        if let Some(tls) = &self.daemon.tls
            && tls.client_cert.is_some() != tls.client_key.is_some()
        {
            anyhow::bail!("daemon.tls.client_cert and daemon.tls.client_key must be set together");
        }

        if let Some(size) = &self.environment.default_memory_limit {
            parse_size(size)
                .with_context(|| format!("Invalid environment.default_memory_limit: {}", size))?;
        }

        Ok(())
    }

    /// Convert to the daemon client configuration
    pub fn to_daemon_config(&self) -> DaemonConfig {
        let config = DaemonConfig::default()
            .with_endpoint(self.daemon.endpoint.clone())
            .with_timeouts(
                Duration::from_millis(self.daemon.connect_timeout_ms),
                Duration::from_millis(self.daemon.read_timeout_ms),
            );
        match &self.daemon.tls {
            Some(tls) => config.with_tls(TlsConfig {
                ca_cert: tls.ca_cert.clone(),
                client_cert: tls.client_cert.clone(),
                client_key: tls.client_key.clone(),
            }),
            None => config,
        }
    }

    /// Default memory limit in bytes, if configured
    pub fn default_memory_limit_bytes(&self) -> Result<Option<u64>> {
        self.environment
            .default_memory_limit
            .as_deref()
            .map(parse_size)
            .transpose()
    }
}

/// Parse a human-readable size string (e.g., "512m", "700GB", "1.5g").
///
/// Units are binary multiples; a bare number is a byte count.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let s = s.strip_suffix('B').filter(|rest| !rest.is_empty()).unwrap_or(&s);

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('T') {
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('G') {
        (num, 1024u64 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('M') {
        (num, 1024u64 * 1024)
    } else if let Some(num) = s.strip_suffix('K') {
        (num, 1024u64)
    } else {
        // Assume bytes
        (s, 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        anyhow::bail!("Size must be a non-negative number: {}", num_str);
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1MB").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("256m").unwrap(), 256 * 1024 * 1024);
        assert_eq!(parse_size("2g").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("1TB").unwrap(), 1024u64 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("1.5GB").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("B").is_err());
        assert!(parse_size("-1m").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = BerthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.daemon.endpoint, "unix:///var/run/docker.sock");
        assert_eq!(config.daemon.read_timeout_ms, 60_000);

        let daemon = config.to_daemon_config();
        assert_eq!(daemon.connect_timeout, Duration::from_secs(60));
        assert!(daemon.tls.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[daemon]
endpoint = "tcp://10.0.0.5:2376"
connect_timeout_ms = 5000

[daemon.tls]
ca_cert = "/etc/berth/ca.pem"
client_cert = "/etc/berth/cert.pem"
client_key = "/etc/berth/key.pem"

[environment]
default_memory_limit = "2GB"
"#;
        let config: BerthConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.daemon.connect_timeout_ms, 5000);
        assert_eq!(config.daemon.read_timeout_ms, 60_000);
        assert_eq!(
            config.default_memory_limit_bytes().unwrap(),
            Some(2 * 1024 * 1024 * 1024)
        );

        let daemon = config.to_daemon_config();
        let tls = daemon.tls.unwrap();
        assert_eq!(tls.client_key, Some(PathBuf::from("/etc/berth/key.pem")));
    }

    #[test]
    fn test_partial_client_tls_rejected() {
        let toml_str = r#"
[daemon]
endpoint = "tcp://daemon:2376"

[daemon.tls]
client_cert = "/etc/berth/cert.pem"
"#;
        let config: BerthConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero: BerthConfig = toml::from_str("[daemon]\nread_timeout_ms = 0\n").unwrap();
        assert!(zero.validate().is_err());

        let endpoint: BerthConfig = toml::from_str("[daemon]\nendpoint = \"ftp://x\"\n").unwrap();
        assert!(endpoint.validate().is_err());

        let size: BerthConfig =
            toml::from_str("[environment]\ndefault_memory_limit = \"huge\"\n").unwrap();
        assert!(size.validate().is_err());
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = BerthConfig::new();
        config.override_endpoint(None);
        config.override_endpoint(Some("  ".to_string()));
        assert_eq!(config.daemon.endpoint, DEFAULT_ENDPOINT);

        config.override_endpoint(Some("tcp://127.0.0.1:2375".to_string()));
        assert_eq!(config.to_daemon_config().endpoint, "tcp://127.0.0.1:2375");
    }

    #[test]
    fn test_load_and_discover_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon]\nendpoint = \"unix:///tmp/d.sock\"\n").unwrap();

        let config = BerthConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.daemon.endpoint, "unix:///tmp/d.sock");

        assert!(BerthConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
