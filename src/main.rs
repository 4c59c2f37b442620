// src/main.rs

use anyhow::Result;
use berth::config::BerthConfig;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, DaemonCommands, EnvCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        return commands::cmd_completions(shell);
    }

    let mut config = BerthConfig::discover(cli.config.as_deref())?;
    config.override_endpoint(std::env::var("DOCKER_HOST").ok().filter(|s| !s.is_empty()));
    config.override_endpoint(cli.endpoint);
    config.validate()?;
    debug!("Daemon endpoint: {}", config.daemon.endpoint);

    match cli.command {
        Commands::Env(cmd) => match cmd {
            EnvCommands::Validate {
                recipe,
                content_type,
                machines,
            } => commands::cmd_env_validate(&config, &recipe, content_type.as_deref(), &machines),
            EnvCommands::Order {
                recipe,
                content_type,
            } => commands::cmd_env_order(&config, &recipe, content_type.as_deref()),
        },

        Commands::Daemon(cmd) => match cmd {
            DaemonCommands::Ping => commands::cmd_daemon_ping(&config),
            DaemonCommands::Version => commands::cmd_daemon_version(&config),
            DaemonCommands::Request {
                method,
                path,
                query,
                headers,
                data,
            } => commands::cmd_daemon_request(
                &config,
                &method,
                &path,
                &query,
                &headers,
                data.as_deref(),
            ),
        },

        Commands::Completions { .. } => Ok(()),
    }
}
