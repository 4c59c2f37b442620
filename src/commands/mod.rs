// src/commands/mod.rs
//! Command handlers for the berth CLI

mod daemon;
mod env;

pub use daemon::{cmd_daemon_ping, cmd_daemon_request, cmd_daemon_version};
pub use env::{cmd_env_order, cmd_env_validate};

use crate::cli::Cli;
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

/// Write a completion script for `shell` to stdout
pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
