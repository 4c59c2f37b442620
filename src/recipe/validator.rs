// src/recipe/validator.rs

//! Structural validation of recipe services
//!
//! Runs after ordering, so every check sees services in start order. The
//! first failure aborts validation; its message names the offending service
//! and reference.

use crate::error::{Error, Result};
use crate::recipe::format::Service;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static SERVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

static EXPOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*(/(tcp|udp))?$").expect("valid regex"));

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<service>[A-Za-z0-9._-]+)(:[A-Za-z0-9._-]+)?$").expect("valid regex")
});

static VOLUMES_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<service>[A-Za-z0-9._-]+)(:(ro|rw))?$").expect("valid regex")
});

/// Checks recipe services against the rules a startable environment must meet
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentValidator;

impl EnvironmentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `services` and the machine names declared alongside them
    pub fn validate<'a, I>(&self, services: &IndexMap<String, Service>, machine_names: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if services.is_empty() {
            return Err(invalid("Recipe should contain at least 1 service".to_string()));
        }

        let missing: Vec<&str> = machine_names
            .into_iter()
            .filter(|machine| !services.contains_key(*machine))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!(
                "Recipe is missing services declared as machines: {}",
                missing.join(", ")
            )));
        }

        for (name, service) in services {
            self.validate_service(name, service, services)?;
        }
        Ok(())
    }

    fn validate_service(
        &self,
        name: &str,
        service: &Service,
        services: &IndexMap<String, Service>,
    ) -> Result<()> {
        if !SERVICE_NAME.is_match(name) {
            return Err(invalid(format!("Service name '{}' is invalid", name)));
        }

        check_image_source(name, service)?;

        for port in &service.expose {
            if !EXPOSE.is_match(port) {
                return Err(invalid(format!(
                    "Exposed port '{}' in service '{}' is invalid",
                    port, name
                )));
            }
        }

        for link in &service.links {
            let target = captured_service(&LINK, link).ok_or_else(|| {
                invalid(format!("Link '{}' in service '{}' is invalid", link, name))
            })?;
            check_reference(name, target, services, "link to")?;
        }

        for dependency in &service.depends_on {
            if !SERVICE_NAME.is_match(dependency) {
                return Err(invalid(format!(
                    "Dependency '{}' in service '{}' is invalid",
                    dependency, name
                )));
            }
            check_reference(name, dependency, services, "dependency on")?;
        }

        for source in &service.volumes_from {
            let target = captured_service(&VOLUMES_FROM, source).ok_or_else(|| {
                invalid(format!(
                    "Service '{}' contains invalid volumes_from entry '{}'",
                    name, source
                ))
            })?;
            check_reference(name, target, services, "volumes_from reference to")?;
        }

        match service.forbidden_field() {
            Some("ports") => Err(invalid(format!(
                "Ports binding is forbidden but found in service '{}'",
                name
            ))),
            Some("volumes") => Err(invalid(format!(
                "Volumes binding is forbidden but found in service '{}'",
                name
            ))),
            Some(field) => Err(invalid(format!(
                "Field '{}' is forbidden but found in service '{}'",
                field, name
            ))),
            None => Ok(()),
        }
    }
}

/// Exactly one of a non-empty image or a build section; a build section
/// needs exactly one of context or inline Dockerfile content. A Dockerfile
/// path only makes sense next to a context.
fn check_image_source(name: &str, service: &Service) -> Result<()> {
    let has_image = service.image.as_deref().is_some_and(|image| !image.is_empty());
    match (&service.build, has_image) {
        (Some(_), true) => Err(invalid(format!(
            "Service '{}' contains mutually exclusive image and build fields",
            name
        ))),
        (None, false) => Err(invalid(format!(
            "Service '{}' has neither image nor build section",
            name
        ))),
        (None, true) => Ok(()),
        (Some(build), false) => {
            let has_context = build.context.as_deref().is_some_and(|c| !c.is_empty());
            let has_content = build
                .dockerfile_content
                .as_deref()
                .is_some_and(|d| !d.is_empty());
            match (has_context, has_content) {
                (true, true) => Err(invalid(format!(
                    "Build section of service '{}' contains mutually exclusive context and dockerfile_content fields",
                    name
                ))),
                (false, false) => Err(invalid(format!(
                    "Build section of service '{}' must contain context or dockerfile_content",
                    name
                ))),
                _ => Ok(()),
            }
        }
    }
}

fn check_reference(
    service: &str,
    target: &str,
    services: &IndexMap<String, Service>,
    relation: &str,
) -> Result<()> {
    if target == service {
        return Err(invalid(format!(
            "Service '{}' contains {} itself",
            service, relation
        )));
    }
    if !services.contains_key(target) {
        return Err(invalid(format!(
            "Service '{}' contains {} non existing service '{}'",
            service, relation, target
        )));
    }
    Ok(())
}

fn captured_service<'a>(pattern: &Regex, reference: &'a str) -> Option<&'a str> {
    pattern
        .captures(reference)
        .and_then(|caps| caps.name("service"))
        .map(|service| service.as_str())
}

fn invalid(message: String) -> Error {
    Error::Validation(message)
}
