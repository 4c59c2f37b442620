// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are compose-style YAML documents describing a set of services.
//! Only the subset needed to order and provision services is interpreted;
//! everything else is carried along untouched.
//!
//! ```yaml
//! version: "3"
//! services:
//!   db:
//!     image: postgres:16
//!     mem_limit: 512m
//!   web:
//!     build:
//!       context: ./web
//!     expose: ["8080/tcp"]
//!     links: ["db:database"]
//! ```

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// A complete compose recipe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeRecipe {
    /// Format version (`version: 3` and `version: "3"` are the same)
    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Services in declaration order
    #[serde(default, deserialize_with = "service_map")]
    pub services: IndexMap<String, Service>,

    /// Top-level keys this crate does not interpret
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// One service of a recipe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Build section; `build: ./dir` is shorthand for `build: {context: ./dir}`
    #[serde(default, deserialize_with = "build_section", skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,

    /// Exposed ports, e.g. `8080` or `8080/udp`
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,

    /// `service` or `service:alias`
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Service names, as a list or as the keys of a mapping
    #[serde(default, deserialize_with = "name_list", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// `service`, `service:ro` or `service:rw`
    #[serde(default, deserialize_with = "scalar_list", skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,

    /// Memory limit as a size string (`512m`) or byte count
    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<String>,

    #[serde(default, deserialize_with = "opt_scalar", skip_serializing_if = "Option::is_none")]
    pub mem_request: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<CommandLine>,

    /// `KEY: value` mapping or `KEY=value` list
    #[serde(default, deserialize_with = "key_value_map", skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,

    #[serde(default, deserialize_with = "key_value_map", skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,

    // Host bindings this crate refuses. Kept as raw values so presence is
    // detected even for `ports: ~`.
    #[serde(default, deserialize_with = "presence", skip_serializing_if = "Option::is_none")]
    pub ports: Option<Value>,

    #[serde(default, deserialize_with = "presence", skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Value>,

    #[serde(default, deserialize_with = "presence", skip_serializing_if = "Option::is_none")]
    pub networks: Option<Value>,

    /// Keys this crate does not interpret
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Service {
    /// Service built from an image
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_build(mut self, build: BuildSection) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_expose(mut self, port: impl Into<String>) -> Self {
        self.expose.push(port.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    pub fn with_depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(service.into());
        self
    }

    pub fn with_volumes_from(mut self, source: impl Into<String>) -> Self {
        self.volumes_from.push(source.into());
        self
    }

    pub fn with_memory(mut self, limit: Option<String>, request: Option<String>) -> Self {
        self.mem_limit = limit;
        self.mem_request = request;
        self
    }

    /// Name of the first forbidden host-binding field present, if any
    pub fn forbidden_field(&self) -> Option<&'static str> {
        if self.ports.is_some() {
            Some("ports")
        } else if self.volumes.is_some() {
            Some("volumes")
        } else if self.networks.is_some() {
            Some("networks")
        } else {
            None
        }
    }
}

/// Build instructions for a service.
///
/// A build starts either from a context or from inline Dockerfile content.
/// `dockerfile` is a path inside the context and may accompany it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Build context location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Dockerfile path, relative to the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    /// Inline Dockerfile content
    #[serde(
        default,
        alias = "dockerfileContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub dockerfile_content: Option<String>,
}

impl BuildSection {
    pub fn context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Default::default()
        }
    }

    /// Build from inline Dockerfile content
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            dockerfile_content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_dockerfile(mut self, path: impl Into<String>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }
}

/// Shell-form or exec-form command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Shell(String),
    Exec(Vec<String>),
}

/// Render a YAML scalar as a string; `None` for null, sequences and maps
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => scalar_to_string(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected a string or number")),
    }
}

fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| de::Error::custom("list entries must be strings or numbers"))
            })
            .collect(),
        _ => Err(de::Error::custom("expected a list")),
    }
}

fn name_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Mapping(map) => map
            .keys()
            .map(|key| {
                scalar_to_string(key)
                    .ok_or_else(|| de::Error::custom("service names must be strings"))
            })
            .collect(),
        other => scalar_list(other).map_err(de::Error::custom),
    }
}

fn key_value_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut out = IndexMap::new();
    match Value::deserialize(deserializer)? {
        Value::Null => {}
        Value::Mapping(map) => {
            for (key, value) in &map {
                let key = scalar_to_string(key)
                    .ok_or_else(|| de::Error::custom("keys must be strings"))?;
                out.insert(key, scalar_to_string(value).unwrap_or_default());
            }
        }
        Value::Sequence(items) => {
            for item in &items {
                let entry = scalar_to_string(item)
                    .ok_or_else(|| de::Error::custom("entries must be KEY=value strings"))?;
                match entry.split_once('=') {
                    Some((key, value)) => out.insert(key.to_string(), value.to_string()),
                    None => out.insert(entry, String::new()),
                };
            }
        }
        _ => return Err(de::Error::custom("expected a mapping or a list")),
    }
    Ok(out)
}

fn build_section<'de, D>(deserializer: D) -> Result<Option<BuildSection>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(context) => Ok(Some(BuildSection::context(context))),
        value @ Value::Mapping(_) => serde_yaml::from_value(value)
            .map(Some)
            .map_err(de::Error::custom),
        _ => Err(de::Error::custom("build must be a path or a mapping")),
    }
}

fn presence<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn service_map<'de, D>(deserializer: D) -> Result<IndexMap<String, Service>, D::Error>
where
    D: Deserializer<'de>,
{
    // `services:` with nothing under it, and `db:` with no body, are both null
    let raw: Option<IndexMap<String, Option<Service>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, service)| (name, service.unwrap_or_default()))
        .collect())
}
