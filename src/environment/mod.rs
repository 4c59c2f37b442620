// src/environment/mod.rs

//! Environments built from compose recipes
//!
//! [`EnvironmentFactory`] is the entry point:
//!
//! ```text
//! recipe text ─► content type check ─► parse ─► memory propagation
//!             ─► start order ─► validate ─► Environment
//! ```
//!
//! The resulting [`Environment`] lists its services in start order and is
//! not modified afterwards except through the consuming `with_*` methods.

pub mod memory;

use crate::error::{Error, Result};
use crate::recipe::{EnvironmentValidator, Service, StartOrderResolver, check_content_type, parse};
use indexmap::IndexMap;
use tracing::info;

pub use memory::{
    DefaultMemoryProvisioner, MEMORY_LIMIT_ATTRIBUTE, MEMORY_REQUEST_ATTRIBUTE, MemoryProvisioner,
};

/// Recipe type this crate builds
pub const COMPOSE_RECIPE_TYPE: &str = "compose";

/// Recipe as handed over by whatever fetched it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeContent {
    pub content: String,
    pub content_type: String,
    /// Recipe flavour, e.g. `compose`
    pub recipe_type: String,
}

impl RecipeContent {
    /// Compose recipe with the given content and content type
    pub fn compose(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
            recipe_type: COMPOSE_RECIPE_TYPE.to_string(),
        }
    }
}

/// Per-machine settings: free-form attributes and agents to install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineConfig {
    attributes: IndexMap<String, String>,
    agents: Vec<String>,
}

impl MachineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agents.push(agent.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub(crate) fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }
}

/// A validated environment with services in start order
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    version: Option<String>,
    services: IndexMap<String, Service>,
    weights: IndexMap<String, u32>,
    recipe: RecipeContent,
    machines: IndexMap<String, MachineConfig>,
    warnings: Vec<String>,
}

impl Environment {
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Services in start order
    pub fn services(&self) -> &IndexMap<String, Service> {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Service names in start order
    pub fn start_order(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// Dependency weight of each service, in declaration order
    pub fn weights(&self) -> &IndexMap<String, u32> {
        &self.weights
    }

    /// Recipe the environment was built from
    pub fn recipe(&self) -> &RecipeContent {
        &self.recipe
    }

    pub fn machines(&self) -> &IndexMap<String, MachineConfig> {
        &self.machines
    }

    pub fn machine(&self, name: &str) -> Option<&MachineConfig> {
        self.machines.get(name)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Replace or add a machine configuration
    pub fn with_machine(mut self, name: impl Into<String>, machine: MachineConfig) -> Self {
        self.machines.insert(name.into(), machine);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Builds environments from recipes
pub struct EnvironmentFactory {
    memory: Box<dyn MemoryProvisioner>,
    validator: EnvironmentValidator,
}

impl Default for EnvironmentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentFactory {
    pub fn new() -> Self {
        Self::with_memory_provisioner(DefaultMemoryProvisioner::new())
    }

    pub fn with_memory_provisioner(provisioner: impl MemoryProvisioner + 'static) -> Self {
        Self {
            memory: Box::new(provisioner),
            validator: EnvironmentValidator::new(),
        }
    }

    /// Build an environment from recipe text.
    ///
    /// `machines` carries configuration declared outside the recipe; every
    /// key must name a service. Entries are created for services that have
    /// none.
    pub fn build(
        &self,
        recipe: &str,
        content_type: &str,
        mut machines: IndexMap<String, MachineConfig>,
    ) -> Result<Environment> {
        check_content_type(content_type)?;
        let parsed = parse(recipe, content_type)?;
        let declared: Vec<String> = machines.keys().cloned().collect();

        for (name, service) in &parsed.services {
            let machine = machines.entry(name.clone()).or_default();
            self.memory.provision(
                machine,
                name,
                service.mem_limit.as_deref(),
                service.mem_request.as_deref(),
            )?;
        }

        let (services, weights) = StartOrderResolver::order_with_weights(parsed.services)?;
        self.validator
            .validate(&services, declared.iter().map(String::as_str))?;

        info!(
            "Built environment with {} service(s): {}",
            services.len(),
            services.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(Environment {
            version: parsed.version,
            services,
            weights,
            recipe: RecipeContent::compose(recipe, content_type),
            machines,
            warnings: parsed.warnings,
        })
    }

    /// Build from a fetched recipe; only `compose` recipes are supported
    pub fn build_from(
        &self,
        recipe: &RecipeContent,
        machines: IndexMap<String, MachineConfig>,
    ) -> Result<Environment> {
        if recipe.recipe_type != COMPOSE_RECIPE_TYPE {
            return Err(Error::Validation(format!(
                "Recipe type '{}' is not supported. Supported types: {}",
                recipe.recipe_type, COMPOSE_RECIPE_TYPE
            )));
        }
        self.build(&recipe.content, &recipe.content_type, machines)
    }
}
