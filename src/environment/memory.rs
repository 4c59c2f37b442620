// src/environment/memory.rs

//! Memory attribute propagation
//!
//! Services may declare `mem_limit` / `mem_request` as size strings. Before
//! ordering, each is converted to a byte count and recorded on the machine
//! of the same name. A value already set on the machine wins over the
//! recipe.

use super::MachineConfig;
use crate::config::parse_size;
use crate::error::{Error, Result};
use tracing::debug;

/// Machine attribute holding the memory limit in bytes
pub const MEMORY_LIMIT_ATTRIBUTE: &str = "memoryLimitBytes";

/// Machine attribute holding the memory request in bytes
pub const MEMORY_REQUEST_ATTRIBUTE: &str = "memoryRequestBytes";

/// Records a service's memory settings on its machine configuration
pub trait MemoryProvisioner: Send + Sync {
    fn provision(
        &self,
        machine: &mut MachineConfig,
        name: &str,
        mem_limit: Option<&str>,
        mem_request: Option<&str>,
    ) -> Result<()>;
}

/// Converts size strings into byte attributes, with an optional fallback
/// limit for services that declare none
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMemoryProvisioner {
    default_limit: Option<u64>,
}

impl DefaultMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit applied when neither the machine nor the service sets one
    pub fn with_default_limit(mut self, bytes: Option<u64>) -> Self {
        self.default_limit = bytes;
        self
    }

    fn apply(
        machine: &mut MachineConfig,
        name: &str,
        attribute: &str,
        declared: Option<&str>,
        fallback: Option<u64>,
    ) -> Result<()> {
        if let Some(existing) = machine.attribute(attribute) {
            if existing.trim().parse::<u64>().is_err() {
                return Err(Error::Validation(format!(
                    "Value of attribute '{}' of machine '{}' is illegal",
                    attribute, name
                )));
            }
            return Ok(());
        }

        let bytes = match declared {
            Some(size) => Some(parse_size(size).map_err(|_| {
                Error::Validation(format!(
                    "Memory value '{}' of service '{}' is illegal",
                    size, name
                ))
            })?),
            None => fallback,
        };
        if let Some(bytes) = bytes {
            debug!(machine = name, attribute, bytes, "memory attribute set");
            machine.set_attribute(attribute, bytes.to_string());
        }
        Ok(())
    }
}

impl MemoryProvisioner for DefaultMemoryProvisioner {
    fn provision(
        &self,
        machine: &mut MachineConfig,
        name: &str,
        mem_limit: Option<&str>,
        mem_request: Option<&str>,
    ) -> Result<()> {
        Self::apply(machine, name, MEMORY_LIMIT_ATTRIBUTE, mem_limit, self.default_limit)?;
        Self::apply(machine, name, MEMORY_REQUEST_ATTRIBUTE, mem_request, None)
    }
}
