//! Typed metadata bags
//!
//! Event details, relationship metadata and stage results are flat maps of
//! scalar values. Optional per-type schemas pin the kind of selected keys.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::models::{EventType, RelationshipType};
use crate::error::{LineageError, Result};

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl MetadataValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            MetadataValue::Null => ScalarKind::Null,
            MetadataValue::Bool(_) => ScalarKind::Bool,
            MetadataValue::Number(_) => ScalarKind::Number,
            MetadataValue::String(_) => ScalarKind::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Key-value bag with deterministic key order
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Reject NaN and infinite numbers, which JSON cannot carry
pub fn check_finite(context: &str, metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if let MetadataValue::Number(n) = value {
            if !n.is_finite() {
                return Err(LineageError::validation(format!(
                    "{}: key '{}' must be a finite number, got {}",
                    context, key, n
                )));
            }
        }
    }
    Ok(())
}

/// Scalar kind declared by a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Null,
    Bool,
    Number,
    String,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarKind::Null => "null",
            ScalarKind::Bool => "bool",
            ScalarKind::Number => "number",
            ScalarKind::String => "string",
        };
        write!(f, "{}", s)
    }
}

/// Declared field of a metadata schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub kind: ScalarKind,
    #[serde(default)]
    pub required: bool,
}

/// Schema for one event or relationship type
///
/// Undeclared keys are accepted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataSchema {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl MetadataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, kind: ScalarKind, required: bool) -> Self {
        self.fields.insert(key.into(), FieldSpec { kind, required });
        self
    }

    /// Check a bag against this schema
    pub fn validate(&self, context: &str, metadata: &Metadata) -> Result<()> {
        for (key, spec) in &self.fields {
            match metadata.get(key) {
                None if spec.required => {
                    return Err(LineageError::validation(format!(
                        "{}: missing required key '{}'",
                        context, key
                    )));
                }
                None => {}
                Some(value) if value.kind() != spec.kind => {
                    return Err(LineageError::validation(format!(
                        "{}: key '{}' must be {}, got {}",
                        context,
                        key,
                        spec.kind,
                        value.kind()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Per-type schemas for event details and relationship metadata
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    events: HashMap<EventType, MetadataSchema>,
    relationships: HashMap<RelationshipType, MetadataSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_event(&mut self, event_type: EventType, schema: MetadataSchema) {
        self.events.insert(event_type, schema);
    }

    pub fn register_relationship(
        &mut self,
        relationship_type: RelationshipType,
        schema: MetadataSchema,
    ) {
        self.relationships.insert(relationship_type, schema);
    }

    pub fn validate_event(&self, event_type: EventType, details: &Metadata) -> Result<()> {
        match self.events.get(&event_type) {
            Some(schema) => schema.validate(&format!("{} details", event_type), details),
            None => Ok(()),
        }
    }

    pub fn validate_relationship(
        &self,
        relationship_type: RelationshipType,
        metadata: &Metadata,
    ) -> Result<()> {
        match self.relationships.get(&relationship_type) {
            Some(schema) => schema.validate(&format!("{} metadata", relationship_type), metadata),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_metadata_untagged_serde() {
        let mut bag = Metadata::new();
        bag.insert("format".into(), "pdf".into());
        bag.insert("pages".into(), 12i64.into());
        bag.insert("signed".into(), true.into());
        bag.insert("note".into(), MetadataValue::Null);

        let json = serde_json::to_string(&bag).unwrap();
        assert_eq!(
            json,
            r#"{"format":"pdf","note":null,"pages":12.0,"signed":true}"#
        );

        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bag);
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        let mut bag = Metadata::new();
        bag.insert("pages".into(), 3i64.into());
        assert!(check_finite("details", &bag).is_ok());

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            bag.insert("score".into(), bad.into());
            let err = check_finite("details", &bag).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
            assert!(err.message.contains("'score'"));
        }
    }

    #[test]
    fn test_nested_values_rejected() {
        let result = serde_json::from_str::<Metadata>(r#"{"nested":{"a":1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_required_key() {
        let schema = MetadataSchema::new().field("format", ScalarKind::String, true);
        let err = schema.validate("EXPORT details", &Metadata::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("format"));
    }

    #[test]
    fn test_schema_kind_mismatch() {
        let schema = MetadataSchema::new().field("pages", ScalarKind::Number, false);
        let mut bag = Metadata::new();
        bag.insert("pages".into(), "twelve".into());

        let err = schema.validate("ctx", &bag).unwrap_err();
        assert!(err.message.contains("must be number"));
    }

    #[test]
    fn test_schema_accepts_undeclared_keys() {
        let schema = MetadataSchema::new().field("pages", ScalarKind::Number, false);
        let mut bag = Metadata::new();
        bag.insert("extra".into(), true.into());
        assert!(schema.validate("ctx", &bag).is_ok());
    }

    #[test]
    fn test_registry_only_checks_registered_types() {
        let mut registry = SchemaRegistry::new();
        registry.register_event(
            EventType::Export,
            MetadataSchema::new().field("format", ScalarKind::String, true),
        );

        assert!(registry
            .validate_event(EventType::View, &Metadata::new())
            .is_ok());
        assert!(registry
            .validate_event(EventType::Export, &Metadata::new())
            .is_err());
    }
}
