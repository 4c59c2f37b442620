// src/cli/env.rs
//! Environment recipe commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum EnvCommands {
    /// Build an environment from a recipe and report problems
    Validate {
        /// Path to the recipe file
        recipe: String,

        /// Recipe content type (inferred from .yml/.yaml)
        #[arg(long)]
        content_type: Option<String>,

        /// Machine declared outside the recipe (repeatable)
        #[arg(short, long = "machine", value_name = "NAME")]
        machines: Vec<String>,
    },

    /// Show services in start order with their weights
    Order {
        /// Path to the recipe file
        recipe: String,

        /// Recipe content type (inferred from .yml/.yaml)
        #[arg(long)]
        content_type: Option<String>,
    },
}
