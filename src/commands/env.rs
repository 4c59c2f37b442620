// src/commands/env.rs

//! Env commands - build environments from recipes

use anyhow::{Context, Result};
use berth::config::BerthConfig;
use berth::environment::{
    DefaultMemoryProvisioner, Environment, EnvironmentFactory, MEMORY_LIMIT_ATTRIBUTE, MachineConfig,
};
use berth::recipe::content_type_for_path;
use indexmap::IndexMap;
use std::path::Path;
use tracing::info;

/// Build the environment described by a recipe file
fn build_environment(
    config: &BerthConfig,
    recipe_path: &str,
    content_type: Option<&str>,
    machines: &[String],
) -> Result<Environment> {
    let path = Path::new(recipe_path);
    let content_type = match content_type {
        Some(content_type) => content_type,
        None => content_type_for_path(path).with_context(|| {
            format!(
                "Cannot infer the content type of {}; pass --content-type",
                path.display()
            )
        })?,
    };

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recipe: {}", path.display()))?;

    let provisioner =
        DefaultMemoryProvisioner::new().with_default_limit(config.default_memory_limit_bytes()?);
    let machines: IndexMap<String, MachineConfig> = machines
        .iter()
        .map(|name| (name.clone(), MachineConfig::new()))
        .collect();

    info!("Building environment from {}", path.display());
    EnvironmentFactory::with_memory_provisioner(provisioner)
        .build(&content, content_type, machines)
        .with_context(|| format!("Invalid recipe: {}", path.display()))
}

/// Validate a recipe and print its warnings
pub fn cmd_env_validate(
    config: &BerthConfig,
    recipe_path: &str,
    content_type: Option<&str>,
    machines: &[String],
) -> Result<()> {
    println!("Reading recipe: {}", recipe_path);
    let env = build_environment(config, recipe_path, content_type, machines)?;

    for warning in env.warnings() {
        println!("Warning: {}", warning);
    }

    println!("Recipe validation passed");
    if env.warnings().is_empty() {
        println!("[OK] {} service(s), no issues found", env.services().len());
    } else {
        println!(
            "[OK] {} service(s), {} warning(s)",
            env.services().len(),
            env.warnings().len()
        );
    }
    Ok(())
}

/// Print services in start order
pub fn cmd_env_order(
    config: &BerthConfig,
    recipe_path: &str,
    content_type: Option<&str>,
) -> Result<()> {
    let env = build_environment(config, recipe_path, content_type, &[])?;

    println!("Start order:");
    for (position, name) in env.start_order().iter().enumerate() {
        let weight = env.weights().get(*name).copied().unwrap_or_default();
        let memory = env
            .machine(name)
            .and_then(|machine| machine.attribute(MEMORY_LIMIT_ATTRIBUTE))
            .map(|bytes| format!("  (memory limit {} bytes)", bytes))
            .unwrap_or_default();
        println!("  {:>2}. {} [weight {}]{}", position + 1, name, weight, memory);
    }
    Ok(())
}
