//! Schema adapter seam
//!
//! The engine never introspects record definitions directly. It talks to a
//! [`SchemaAdapter`]: something that can enumerate a collection's fields,
//! report each field's scalar type (used by the filter parser for coercion),
//! and validate a write body. Host applications plug in whatever schema
//! system they use; [`StaticSchema`] covers the common case of a hand-declared
//! field map.

use crate::core::error::FieldValidationError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Scalar type of a declared field, driving query-value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    /// Unknown or polymorphic; the parser falls back to pattern-based
    /// auto-detection for these.
    Mixed,
}

/// Outcome of validating a write body against the schema.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// Body is acceptable; `data` is the (possibly cleaned) document to store.
    Valid { data: Value },
    /// Body is rejected with per-field errors.
    Invalid(Vec<FieldValidationError>),
}

/// External schema system boundary.
///
/// Implementations must be cheap to call: `fields()` and `field_type()` run
/// on every request that carries filter/sort/projection parameters.
pub trait SchemaAdapter: Send + Sync {
    /// Names of all declared fields for this collection.
    fn fields(&self) -> Vec<String>;

    /// Declared type of a field, or `Mixed` when unknown.
    fn field_type(&self, name: &str) -> FieldType;

    /// Validate a create/replace body.
    fn validate(&self, body: &Value) -> ValidationOutcome;
}

/// A field declaration for [`StaticSchema`].
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub field_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
        }
    }

    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
        }
    }
}

/// Hand-declared schema: an ordered field map with required/optional flags.
///
/// Validation checks that the body is an object, that every required field is
/// present and non-null, and that present fields match their declared scalar
/// type. Unknown fields are dropped from the cleaned document rather than
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    fields: BTreeMap<String, FieldDef>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field declaration (builder style).
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    fn type_matches(field_type: FieldType, value: &Value) -> bool {
        match field_type {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Date => {
                value.as_str().is_some_and(|s| {
                    chrono::DateTime::parse_from_rfc3339(s).is_ok()
                        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                })
            }
            FieldType::Mixed => true,
        }
    }

    fn type_name(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Mixed => "mixed",
        }
    }
}

impl SchemaAdapter for StaticSchema {
    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn field_type(&self, name: &str) -> FieldType {
        self.fields
            .get(name)
            .map(|def| def.field_type)
            .unwrap_or(FieldType::Mixed)
    }

    fn validate(&self, body: &Value) -> ValidationOutcome {
        let Some(obj) = body.as_object() else {
            return ValidationOutcome::Invalid(vec![FieldValidationError {
                field: "(body)".to_string(),
                message: "expected a JSON object".to_string(),
            }]);
        };

        let mut errors = Vec::new();
        let mut cleaned = serde_json::Map::new();

        for (name, def) in &self.fields {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    if def.required {
                        errors.push(FieldValidationError {
                            field: name.clone(),
                            message: "required".to_string(),
                        });
                    }
                }
                Some(value) => {
                    if Self::type_matches(def.field_type, value) {
                        cleaned.insert(name.clone(), value.clone());
                    } else {
                        errors.push(FieldValidationError {
                            field: name.clone(),
                            message: format!("expected {}", Self::type_name(def.field_type)),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            ValidationOutcome::Valid {
                data: Value::Object(cleaned),
            }
        } else {
            ValidationOutcome::Invalid(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> StaticSchema {
        StaticSchema::new()
            .field("name", FieldDef::required(FieldType::String))
            .field("age", FieldDef::optional(FieldType::Number))
            .field("active", FieldDef::optional(FieldType::Boolean))
            .field("joined_at", FieldDef::optional(FieldType::Date))
    }

    #[test]
    fn test_fields_and_types() {
        let schema = user_schema();
        assert!(schema.fields().contains(&"age".to_string()));
        assert_eq!(schema.field_type("age"), FieldType::Number);
        assert_eq!(schema.field_type("unknown"), FieldType::Mixed);
    }

    #[test]
    fn test_validate_ok_drops_unknown_fields() {
        let schema = user_schema();
        let outcome = schema.validate(&json!({"name": "Ada", "age": 36, "$where": "1"}));
        match outcome {
            ValidationOutcome::Valid { data } => {
                assert_eq!(data["name"], "Ada");
                assert!(data.get("$where").is_none());
            }
            ValidationOutcome::Invalid(errors) => panic!("unexpected errors: {:?}", errors),
        }
    }

    #[test]
    fn test_validate_missing_required() {
        let schema = user_schema();
        let outcome = schema.validate(&json!({"age": 36}));
        match outcome {
            ValidationOutcome::Invalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "name");
            }
            ValidationOutcome::Valid { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_validate_type_mismatch() {
        let schema = user_schema();
        let outcome = schema.validate(&json!({"name": "Ada", "age": "thirty"}));
        assert!(matches!(outcome, ValidationOutcome::Invalid(_)));
    }

    #[test]
    fn test_validate_date_field() {
        let schema = user_schema();
        let ok = schema.validate(&json!({"name": "Ada", "joined_at": "2024-03-01"}));
        assert!(matches!(ok, ValidationOutcome::Valid { .. }));

        let bad = schema.validate(&json!({"name": "Ada", "joined_at": "not-a-date"}));
        assert!(matches!(bad, ValidationOutcome::Invalid(_)));
    }

    #[test]
    fn test_validate_non_object_body() {
        let schema = user_schema();
        assert!(matches!(
            schema.validate(&json!([1, 2, 3])),
            ValidationOutcome::Invalid(_)
        ));
    }
}
