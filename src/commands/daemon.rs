// src/commands/daemon.rs

//! Daemon commands - talk to the container daemon

use anyhow::{Context, Result};
use berth::config::BerthConfig;
use berth::daemon::{DaemonClient, Method, RequestBody};
use std::io::Write;
use tracing::info;

fn connect(config: &BerthConfig) -> Result<DaemonClient> {
    let daemon = config.to_daemon_config();
    DaemonClient::new(&daemon)
        .with_context(|| format!("Failed to set up daemon connection to {}", daemon.endpoint))
}

/// Ping the daemon
pub fn cmd_daemon_ping(config: &BerthConfig) -> Result<()> {
    let client = connect(config)?;
    client.ping().context("Daemon did not answer ping")?;
    println!("[OK] Daemon at {} is reachable", config.daemon.endpoint);
    Ok(())
}

/// Print daemon version information
pub fn cmd_daemon_version(config: &BerthConfig) -> Result<()> {
    let client = connect(config)?;
    let version = client.version().context("Failed to query daemon version")?;

    println!("Version:     {}", version.version);
    if let Some(api) = &version.api_version {
        println!("API version: {}", api);
    }
    if let (Some(os), Some(arch)) = (&version.os, &version.arch) {
        println!("Platform:    {}/{}", os, arch);
    }
    Ok(())
}

/// Send a raw request and print status, headers and body
pub fn cmd_daemon_request(
    config: &BerthConfig,
    method: &str,
    path: &str,
    query: &[String],
    headers: &[String],
    data: Option<&str>,
) -> Result<()> {
    let method: Method = method.parse()?;
    let client = connect(config)?;

    let mut connection = client.connection().method(method).path(path);
    for pair in query {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("Query parameter must be name=value: {}", pair))?;
        connection = connection.query(name, value);
    }
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header must be 'Name: value': {}", header))?;
        connection = connection.header(name.trim(), value.trim());
    }
    if let Some(data) = data {
        connection = connection.entity(RequestBody::Bytes(data.as_bytes().to_vec()));
    }

    info!("{} {}", method, connection.request().target());
    let mut response = connection.execute()?;

    let head = response.head()?.clone();
    println!("{}", head.status_line());
    for line in head.raw_headers() {
        println!("{}", line);
    }
    println!();

    let mut stdout = std::io::stdout().lock();
    std::io::copy(response.body()?, &mut stdout)
        .map_err(berth::Error::from_io)
        .context("Failed to read response body")?;
    stdout.flush()?;
    response.close();
    Ok(())
}
