// src/cli/daemon.rs
//! Container daemon commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Check that the daemon answers
    Ping,

    /// Show daemon version information
    Version,

    /// Send a raw request and print the response
    Request {
        /// Request method (GET, HEAD, POST, PUT, DELETE)
        method: String,

        /// Request path, e.g. /containers/json
        path: String,

        /// Query parameter as name=value (repeatable)
        #[arg(short, long = "query", value_name = "NAME=VALUE")]
        query: Vec<String>,

        /// Header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,
    },
}
