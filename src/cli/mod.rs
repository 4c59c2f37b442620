// src/cli/mod.rs
//! CLI definitions for berth
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `env` - Validate recipes and show service start order
//! - `daemon` - Talk to the container daemon
//! - `completions` - Shell completion scripts

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod daemon;
mod env;

pub use daemon::DaemonCommands;
pub use env::EnvCommands;

#[derive(Parser)]
#[command(name = "berth")]
#[command(author = "Berth Project")]
#[command(version)]
#[command(about = "Multi-container development environments on a container daemon", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Daemon endpoint (unix:///path, tcp://host:port, http(s)://...)
    #[arg(long, global = true, value_name = "URI")]
    pub endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Environment recipe commands
    #[command(subcommand)]
    Env(EnvCommands),

    /// Container daemon commands
    #[command(subcommand)]
    Daemon(DaemonCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
