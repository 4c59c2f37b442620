// src/recipe/mod.rs

//! Compose recipes
//!
//! A recipe declares the services of an environment. Turning one into a
//! startable environment takes three steps:
//!
//! - **Parse**: check the content type and read the YAML (`parser`)
//! - **Order**: weight services by their dependencies (`graph`)
//! - **Validate**: enforce naming, image-source and reference rules (`validator`)
//!
//! # Example Recipe
//!
//! ```yaml
//! version: "3"
//! services:
//!   db:
//!     image: postgres:16
//!     expose: ["5432"]
//!   web:
//!     image: nginx
//!     depends_on: [db]
//!     links: ["db:database"]
//! ```
//!
//! Host bindings (`ports`, `volumes`, `networks`) are rejected; the
//! environment runtime owns those.

pub mod format;
pub mod graph;
pub mod parser;
pub mod validator;

pub use format::{BuildSection, CommandLine, ComposeRecipe, Service};
pub use graph::{ServiceGraph, StartOrderResolver};
pub use parser::{
    ParsedRecipe, SUPPORTED_CONTENT_TYPES, check_content_type, content_type_for_path,
    is_supported_content_type, parse, parse_file,
};
pub use validator::EnvironmentValidator;
