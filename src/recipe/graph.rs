// src/recipe/graph.rs

//! Service dependency graph and start ordering
//!
//! A service depends on every service it names in `depends_on`, `links`
//! (`service[:alias]`) and `volumes_from` (`service[:mode]`). Each service
//! gets a weight:
//!
//! ```text
//! weight(s) = 0                                  no dependencies
//! weight(s) = 1 + max(weight(d) for d in deps)   otherwise
//! ```
//!
//! Services start in ascending weight order; equal weights keep declaration
//! order.
//!
//! # Example
//!
//! ```ignore
//! use berth::recipe::graph::StartOrderResolver;
//!
//! let ordered = StartOrderResolver::order(parsed.services)?;
//! // db (0), cache (0), web (1)
//! ```

use crate::error::{Error, Result};
use crate::recipe::format::Service;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// Directed graph of service dependencies, in declaration order
#[derive(Debug, Default, Clone)]
pub struct ServiceGraph {
    /// Service name -> services it depends on
    edges: IndexMap<String, IndexSet<String>>,
}

impl ServiceGraph {
    /// Build the graph for a set of services.
    ///
    /// Fails on malformed references, self-references and references to
    /// services that are not declared.
    pub fn from_services(services: &IndexMap<String, Service>) -> Result<Self> {
        let mut edges = IndexMap::with_capacity(services.len());
        for (name, service) in services {
            let mut deps = IndexSet::new();
            for dep in &service.depends_on {
                deps.insert(dep.clone());
            }
            for link in &service.links {
                deps.insert(reference_target(name, link, "link")?);
            }
            for source in &service.volumes_from {
                deps.insert(reference_target(name, source, "volumes_from")?);
            }

            for dep in &deps {
                if dep == name {
                    return Err(Error::Validation(format!(
                        "Service '{}' has a dependency on itself",
                        name
                    )));
                }
                if !services.contains_key(dep) {
                    return Err(Error::Validation(format!(
                        "Dependency '{}' of service '{}' is not declared in the recipe",
                        dep, name
                    )));
                }
            }
            edges.insert(name.clone(), deps);
        }
        Ok(Self { edges })
    }

    pub fn service_count(&self) -> usize {
        self.edges.len()
    }

    /// Direct dependencies of a service
    pub fn dependencies(&self, name: &str) -> Option<&IndexSet<String>> {
        self.edges.get(name)
    }

    /// Services that directly depend on `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(service, _)| service.as_str())
            .collect()
    }

    /// Weight of every service, in declaration order.
    ///
    /// Iterates to a fixed point; a pass that resolves nothing means the
    /// remaining services form or hang off a cycle.
    pub fn weights(&self) -> Result<IndexMap<String, u32>> {
        let mut resolved: IndexMap<&str, u32> = IndexMap::with_capacity(self.edges.len());
        let mut passes = 0;

        while resolved.len() < self.edges.len() {
            passes += 1;
            let mut progressed = false;
            for (name, deps) in &self.edges {
                if resolved.contains_key(name.as_str()) {
                    continue;
                }
                let mut weight = 0;
                let mut ready = true;
                for dep in deps {
                    match resolved.get(dep.as_str()) {
                        Some(dep_weight) => weight = weight.max(dep_weight + 1),
                        None => {
                            ready = false;
                            break;
                        }
                    }
                }
                if ready {
                    resolved.insert(name.as_str(), weight);
                    progressed = true;
                }
            }

            if !progressed {
                let unresolved: Vec<&str> = self
                    .edges
                    .keys()
                    .map(String::as_str)
                    .filter(|name| !resolved.contains_key(name))
                    .collect();
                return Err(Error::Validation(format!(
                    "Launch order of services cannot be resolved, circular dependency detected among: {}",
                    unresolved.join(", ")
                )));
            }
        }
        debug!(passes, services = self.edges.len(), "service weights resolved");

        Ok(self
            .edges
            .keys()
            .map(|name| (name.clone(), resolved.get(name.as_str()).copied().unwrap_or(0)))
            .collect())
    }

    /// Service names in start order
    pub fn start_order(&self) -> Result<Vec<String>> {
        let weights = self.weights()?;
        let mut order: Vec<(String, u32)> = weights.into_iter().collect();
        // Stable: equal weights keep declaration order
        order.sort_by_key(|(_, weight)| *weight);
        Ok(order.into_iter().map(|(name, _)| name).collect())
    }
}

/// Service name part of a `service[:suffix]` reference
fn reference_target(service: &str, reference: &str, kind: &str) -> Result<String> {
    let mut parts = reference.split(':');
    let target = parts.next().unwrap_or("");
    let suffix = parts.next();
    if parts.next().is_some() || target.is_empty() || suffix == Some("") {
        return Err(Error::Validation(format!(
            "Service '{}' contains an invalid {} '{}'",
            service, kind, reference
        )));
    }
    Ok(target.to_string())
}

/// Computes deterministic start orders for recipe services
pub struct StartOrderResolver;

impl StartOrderResolver {
    /// Weight of every service, in declaration order
    pub fn weights(services: &IndexMap<String, Service>) -> Result<IndexMap<String, u32>> {
        ServiceGraph::from_services(services)?.weights()
    }

    /// Reorder services so every service follows its dependencies
    pub fn order(services: IndexMap<String, Service>) -> Result<IndexMap<String, Service>> {
        Self::order_with_weights(services).map(|(ordered, _)| ordered)
    }

    /// Ordered services together with the weights the order came from
    pub fn order_with_weights(
        mut services: IndexMap<String, Service>,
    ) -> Result<(IndexMap<String, Service>, IndexMap<String, u32>)> {
        let graph = ServiceGraph::from_services(&services)?;
        let weights = graph.weights()?;
        let order = graph.start_order()?;

        let mut ordered = IndexMap::with_capacity(services.len());
        for name in order {
            if let Some(service) = services.shift_remove(&name) {
                ordered.insert(name, service);
            }
        }
        debug!(
            order = ?ordered.keys().collect::<Vec<_>>(),
            "start order resolved"
        );
        Ok((ordered, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(entries: Vec<(&str, Service)>) -> IndexMap<String, Service> {
        entries
            .into_iter()
            .map(|(name, service)| (name.to_string(), service))
            .collect()
    }

    fn names(services: &IndexMap<String, Service>) -> Vec<&str> {
        services.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_empty_graph() {
        let ordered = StartOrderResolver::order(IndexMap::new()).unwrap();
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_independent_services_keep_declaration_order() {
        let input = services(vec![
            ("zeta", Service::from_image("a")),
            ("alpha", Service::from_image("b")),
            ("mid", Service::from_image("c")),
        ]);
        let weights = StartOrderResolver::weights(&input).unwrap();
        assert!(weights.values().all(|w| *w == 0));

        let ordered = StartOrderResolver::order(input).unwrap();
        assert_eq!(names(&ordered), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_depends_on() {
        let input = services(vec![
            ("web", Service::from_image("nginx").with_depends_on("db")),
            ("db", Service::from_image("postgres")),
        ]);
        let (ordered, weights) = StartOrderResolver::order_with_weights(input).unwrap();
        assert_eq!(names(&ordered), vec!["db", "web"]);
        assert_eq!(weights["db"], 0);
        assert_eq!(weights["web"], 1);
    }

    #[test]
    fn test_links_and_volumes_from_count_as_dependencies() {
        let input = services(vec![
            ("app", Service::from_image("app").with_link("db:database").with_volumes_from("data:ro")),
            ("data", Service::from_image("busybox")),
            ("db", Service::from_image("postgres").with_volumes_from("data")),
        ]);
        let weights = StartOrderResolver::weights(&input).unwrap();
        assert_eq!(weights["data"], 0);
        assert_eq!(weights["db"], 1);
        assert_eq!(weights["app"], 2);

        let ordered = StartOrderResolver::order(input).unwrap();
        assert_eq!(names(&ordered), vec!["data", "db", "app"]);
    }

    #[test]
    fn test_diamond_weight_is_longest_path() {
        let input = services(vec![
            ("d", Service::from_image("x").with_depends_on("b").with_depends_on("a")),
            ("c", Service::from_image("x").with_depends_on("b")),
            ("b", Service::from_image("x").with_depends_on("a")),
            ("a", Service::from_image("x")),
        ]);
        let weights = StartOrderResolver::weights(&input).unwrap();
        assert_eq!(weights["a"], 0);
        assert_eq!(weights["b"], 1);
        assert_eq!(weights["c"], 2);
        assert_eq!(weights["d"], 2);

        // Weights come back in declaration order
        let keys: Vec<&str> = weights.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["d", "c", "b", "a"]);

        let ordered = StartOrderResolver::order(input).unwrap();
        assert_eq!(names(&ordered), vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_two_service_cycle_names_both() {
        let input = services(vec![
            ("a", Service::from_image("x").with_depends_on("b")),
            ("b", Service::from_image("x").with_link("a")),
        ]);
        let err = StartOrderResolver::order(input).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("circular dependency"), "{message}");
        assert!(message.ends_with("among: a, b"), "{message}");
    }

    #[test]
    fn test_three_service_cycle() {
        let input = services(vec![
            ("ok", Service::from_image("x")),
            ("a", Service::from_image("x").with_depends_on("b")),
            ("b", Service::from_image("x").with_depends_on("c")),
            ("c", Service::from_image("x").with_depends_on("a")),
        ]);
        let message = StartOrderResolver::order(input).unwrap_err().to_string();
        assert!(message.ends_with("a, b, c"), "{message}");
    }

    #[test]
    fn test_self_reference_rejected() {
        let input = services(vec![("a", Service::from_image("x").with_volumes_from("a:rw"))]);
        let message = StartOrderResolver::order(input).unwrap_err().to_string();
        assert!(message.contains("on itself"), "{message}");
    }

    #[test]
    fn test_undeclared_dependency_rejected() {
        let input = services(vec![("a", Service::from_image("x").with_depends_on("ghost"))]);
        let err = StartOrderResolver::order(input).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("'ghost'"));
    }

    #[test]
    fn test_reference_with_two_colons_rejected() {
        let input = services(vec![
            ("a", Service::from_image("x").with_link("b:alias:extra")),
            ("b", Service::from_image("x")),
        ]);
        let message = StartOrderResolver::order(input).unwrap_err().to_string();
        assert!(message.contains("invalid link 'b:alias:extra'"), "{message}");
    }

    #[test]
    fn test_dependents() {
        let input = services(vec![
            ("db", Service::from_image("x")),
            ("web", Service::from_image("x").with_depends_on("db")),
            ("worker", Service::from_image("x").with_link("db")),
        ]);
        let graph = ServiceGraph::from_services(&input).unwrap();
        assert_eq!(graph.service_count(), 3);
        assert_eq!(graph.dependents("db"), vec!["web", "worker"]);
        assert!(graph.dependencies("db").unwrap().is_empty());
    }
}
