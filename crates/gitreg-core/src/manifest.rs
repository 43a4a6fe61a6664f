//! Package manifest model
//!
//! Manifests are kept as opaque ordered JSON objects so unknown fields
//! and field order survive the round trip from git to the registry
//! responses. Known fields get typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RegistryError, Result};

/// A package manifest (`package.json`) discovered in a git tree
///
/// Wraps the raw JSON object verbatim. `serde_json` is built with
/// `preserve_order`, so serializing a manifest reproduces the original
/// key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Parse a manifest from raw bytes
    ///
    /// The document must be a JSON object; any other JSON value is a
    /// parse failure.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::ManifestParse {
                git_ref: String::new(),
                entry: String::new(),
                message: e.to_string(),
            })?;
        match value {
            Value::Object(map) => Ok(Manifest(map)),
            other => Err(RegistryError::ManifestParse {
                git_ref: String::new(),
                entry: String::new(),
                message: format!("expected a JSON object, got {}", json_type_name(&other)),
            }),
        }
    }

    /// Raw field access
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The underlying ordered object
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying ordered object
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Package name
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Package version string (compared lexicographically, not as semver)
    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    /// Description, if present
    pub fn description(&self) -> Value {
        self.field_or_null("description")
    }

    /// Human-facing display name, if present
    pub fn display_name(&self) -> Value {
        self.field_or_null("displayName")
    }

    /// Author, if present
    pub fn author(&self) -> Value {
        self.field_or_null("author")
    }

    /// Unity editor compatibility marker, if present
    pub fn unity(&self) -> Value {
        self.field_or_null("unity")
    }

    /// Dependencies map, defaulting to an empty object
    pub fn dependencies(&self) -> Value {
        self.0
            .get("dependencies")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Keywords list, defaulting to an empty array
    pub fn keywords(&self) -> Value {
        self.0
            .get("keywords")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Maintainers list, defaulting to an empty array
    pub fn maintainers(&self) -> Value {
        self.0
            .get("maintainers")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Registry document id, `name@version`
    pub fn id(&self) -> Option<String> {
        Some(format!("{}@{}", self.name()?, self.version()?))
    }

    fn field_or_null(&self, key: &str) -> Value {
        self.0.get(key).cloned().unwrap_or(Value::Null)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest =
            Manifest::from_slice(br#"{"name":"pkg-a","version":"1.0.0","custom":true}"#).unwrap();
        assert_eq!(manifest.name(), Some("pkg-a"));
        assert_eq!(manifest.version(), Some("1.0.0"));
        assert_eq!(manifest.get("custom"), Some(&Value::Bool(true)));
        assert_eq!(manifest.id().unwrap(), "pkg-a@1.0.0");
    }

    #[test]
    fn test_unknown_fields_and_order_survive() {
        let raw = br#"{"zeta":1,"name":"p","alpha":{"nested":[1,2]},"version":"2"}"#;
        let manifest = Manifest::from_slice(raw).unwrap();
        let out = serde_json::to_string(&manifest).unwrap();
        assert_eq!(out.as_bytes(), raw);
    }

    #[test]
    fn test_defaults_for_absent_fields() {
        let manifest = Manifest::from_slice(br#"{"name":"p","version":"1"}"#).unwrap();
        assert_eq!(manifest.dependencies(), serde_json::json!({}));
        assert_eq!(manifest.keywords(), serde_json::json!([]));
        assert_eq!(manifest.maintainers(), serde_json::json!([]));
        assert_eq!(manifest.description(), Value::Null);
        assert!(manifest.id().is_some());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Manifest::from_slice(b"[1,2,3]").is_err());
        assert!(Manifest::from_slice(b"\"str\"").is_err());
        assert!(Manifest::from_slice(b"not json").is_err());
    }
}
