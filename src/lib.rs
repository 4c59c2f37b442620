// src/lib.rs

//! Berth
//!
//! Multi-container development environments described by compose recipes
//! and launched on a Docker-compatible container daemon.
//!
//! # Architecture
//!
//! - Recipes: compose YAML parsed into ordered services, validated, and
//!   sorted into a start order from links and dependencies
//! - Environments: a validated recipe plus per-service machine configuration
//! - Daemon: HTTP/1.1 over a unix socket or TCP (optionally mutual TLS),
//!   with framed response bodies that release the connection when drained

pub mod config;
pub mod daemon;
pub mod environment;
mod error;
pub mod recipe;

pub use config::BerthConfig;
pub use daemon::{DaemonClient, DaemonConfig, DaemonConnection, DaemonResponse};
pub use environment::{Environment, EnvironmentFactory, MachineConfig};
pub use error::{Error, Result};
pub use recipe::{ComposeRecipe, Service, StartOrderResolver};
