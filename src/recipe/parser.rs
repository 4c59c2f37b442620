// src/recipe/parser.rs

//! Recipe parsing
//!
//! Checks the content type, parses the YAML, and collects non-fatal
//! warnings. Structural rules live in [`crate::recipe::validator`].

use crate::error::{Error, Result};
use crate::recipe::format::{ComposeRecipe, Service};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, warn};

/// Content types accepted for compose recipes
pub const SUPPORTED_CONTENT_TYPES: [&str; 3] = ["application/x-yaml", "text/yaml", "text/x-yaml"];

/// Result of parsing a recipe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecipe {
    pub version: Option<String>,
    /// Services in declaration order
    pub services: IndexMap<String, Service>,
    /// Problems worth reporting that do not stop the build
    pub warnings: Vec<String>,
}

/// True if `content_type` names a YAML media type.
///
/// Parameters such as `; charset=utf-8` are ignored and the comparison is
/// case-insensitive.
pub fn is_supported_content_type(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    SUPPORTED_CONTENT_TYPES
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(media_type))
}

/// Reject content types the parser cannot handle
pub fn check_content_type(content_type: &str) -> Result<()> {
    if is_supported_content_type(content_type) {
        return Ok(());
    }
    Err(Error::Validation(format!(
        "Recipe content type '{}' is not supported. Supported values are: {}",
        content_type,
        SUPPORTED_CONTENT_TYPES.join(", ")
    )))
}

/// Content type implied by a recipe file extension
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
            Some("application/x-yaml")
        }
        _ => None,
    }
}

/// Parse recipe text of the given content type
pub fn parse(content: &str, content_type: &str) -> Result<ParsedRecipe> {
    check_content_type(content_type)?;

    let recipe: ComposeRecipe = if content.trim().is_empty() {
        ComposeRecipe::default()
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Validation(format!("Parsing of recipe failed. Error: {}", e)))?
    };

    let mut warnings = Vec::new();
    if recipe.version.is_none() {
        warnings.push("Recipe does not declare a format version".to_string());
    }
    for key in recipe.extra.keys() {
        warnings.push(format!("Unsupported top-level key '{}' ignored", key));
    }
    for (name, service) in &recipe.services {
        for key in service.extra.keys() {
            warnings.push(format!("Unsupported key '{}' in service '{}' ignored", key, name));
        }
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    debug!(
        services = recipe.services.len(),
        warnings = warnings.len(),
        "parsed recipe"
    );
    Ok(ParsedRecipe {
        version: recipe.version,
        services: recipe.services,
        warnings,
    })
}

/// Parse a recipe file, taking the content type from its extension
pub fn parse_file(path: &Path) -> Result<ParsedRecipe> {
    let content_type = content_type_for_path(path).ok_or_else(|| {
        Error::Validation(format!(
            "Cannot infer recipe content type from '{}'",
            path.display()
        ))
    })?;
    let content = std::fs::read_to_string(path)?;
    parse(&content, content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_matching() {
        assert!(is_supported_content_type("application/x-yaml"));
        assert!(is_supported_content_type("Text/YAML; charset=utf-8"));
        assert!(is_supported_content_type(" text/x-yaml "));
        assert!(!is_supported_content_type("application/json"));
        assert!(!is_supported_content_type(""));
    }

    #[test]
    fn test_json_rejected_before_parsing() {
        // Not even valid YAML; must fail on the content type alone
        let err = parse("{{{{", "application/json").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("application/json"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = parse("services: [unclosed", "text/yaml").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Parsing of recipe failed"));
    }

    #[test]
    fn test_warnings() {
        let parsed = parse(
            "services:\n  db:\n    image: postgres\n    restart: always\n",
            "application/x-yaml",
        )
        .unwrap();
        assert_eq!(parsed.services.len(), 1);
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.warnings[0].contains("version"));
        assert!(parsed.warnings[1].contains("'restart'"));
    }

    #[test]
    fn test_empty_content_has_no_services() {
        let parsed = parse("  \n", "application/x-yaml").unwrap();
        assert!(parsed.services.is_empty());
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("compose.yml")), Some("application/x-yaml"));
        assert_eq!(content_type_for_path(Path::new("a/b.YAML")), Some("application/x-yaml"));
        assert_eq!(content_type_for_path(Path::new("recipe.json")), None);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.yaml");
        std::fs::write(&path, "version: '3'\nservices:\n  db:\n    image: postgres\n").unwrap();
        let parsed = parse_file(&path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("3"));
        assert!(parsed.warnings.is_empty());
    }
}
