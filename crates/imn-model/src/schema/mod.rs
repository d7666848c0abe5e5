//! Declarative input schemas.
//!
//! A schema is data, not code: a list of named fields with types, defaults
//! and constraints. Validation is implemented once here and shared by the
//! agent (before dispatching to a handler) and by the coordinator (request
//! admission), so both sides reject the same inputs.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("request body must be a JSON object")]
    NotObject,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be a {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' must be >= {min}")]
    BelowMinimum { field: String, min: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
}

impl FieldKind {
    fn name(&self) -> &'static str {
        match self {
            FieldKind::Str => "string",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Bool => "boolean",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Str => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
        }
    }
}

/// One named field of a module's input.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Substituted when the field is absent and not required.
    pub default: Option<Value>,
    /// Lower bound for integer fields.
    pub min: Option<i64>,
    /// Alternate field names accepted on the wire and renamed to `name`.
    pub synonyms: &'static [&'static str],
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            min: None,
            synonyms: &[],
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    pub fn with_min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_synonyms(mut self, synonyms: &'static [&'static str]) -> Self {
        self.synonyms = synonyms;
        self
    }
}

/// Input schema of one module.
///
/// Unknown fields are allowed and passed through untouched; the reserved
/// `id` field is always permitted.
#[derive(Debug, Clone)]
pub struct InputSchema {
    pub fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validate `value` in place: rename synonyms, substitute defaults,
    /// check types and bounds. On error the value may have synonyms already
    /// renamed but is otherwise untouched.
    pub fn validate(&self, value: &mut Value) -> Result<(), SchemaError> {
        let obj = value.as_object_mut().ok_or(SchemaError::NotObject)?;

        for field in &self.fields {
            if !obj.contains_key(field.name) {
                for synonym in field.synonyms {
                    if let Some(v) = obj.remove(*synonym) {
                        obj.insert(field.name.to_string(), v);
                        break;
                    }
                }
            }

            match obj.get(field.name) {
                None => {
                    if field.required {
                        return Err(SchemaError::MissingField(field.name.to_string()));
                    }
                    if let Some(default) = &field.default {
                        obj.insert(field.name.to_string(), default.clone());
                    }
                }
                Some(v) => {
                    if !field.kind.matches(v) {
                        return Err(SchemaError::WrongType {
                            field: field.name.to_string(),
                            expected: field.kind.name(),
                        });
                    }
                    if let (Some(min), Some(n)) = (field.min, v.as_i64())
                        && n < min
                    {
                        return Err(SchemaError::BelowMinimum {
                            field: field.name.to_string(),
                            min,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ping_schema() -> InputSchema {
        InputSchema::new(vec![
            FieldSpec::required("host", FieldKind::Str).with_synonyms(&["target"]),
            FieldSpec::optional("count", FieldKind::Int)
                .with_default(json!(3))
                .with_min(1),
            FieldSpec::optional("port", FieldKind::Int).with_default(json!(80)),
        ])
    }

    #[test]
    fn applies_defaults() {
        let mut value = json!({"host": "8.8.8.8"});
        ping_schema().validate(&mut value).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["port"], 80);
    }

    #[test]
    fn renames_synonym() {
        let mut value = json!({"target": "8.8.8.8"});
        ping_schema().validate(&mut value).unwrap();
        assert_eq!(value["host"], "8.8.8.8");
        assert!(value.get("target").is_none());
    }

    #[test]
    fn missing_required_field() {
        let mut value = json!({"count": 3});
        let err = ping_schema().validate(&mut value).unwrap_err();
        assert_eq!(err, SchemaError::MissingField("host".into()));
    }

    #[test]
    fn wrong_type() {
        let mut value = json!({"host": "x", "count": "three"});
        let err = ping_schema().validate(&mut value).unwrap_err();
        assert!(matches!(err, SchemaError::WrongType { field, .. } if field == "count"));
    }

    #[test]
    fn below_minimum() {
        let mut value = json!({"host": "x", "count": 0});
        let err = ping_schema().validate(&mut value).unwrap_err();
        assert_eq!(
            err,
            SchemaError::BelowMinimum {
                field: "count".into(),
                min: 1
            }
        );
    }

    #[test]
    fn rejects_non_object() {
        let mut value = json!([1, 2]);
        assert_eq!(
            ping_schema().validate(&mut value).unwrap_err(),
            SchemaError::NotObject
        );
    }

    #[test]
    fn unknown_fields_pass_through() {
        let mut value = json!({"host": "x", "extra": true, "id": "w1"});
        ping_schema().validate(&mut value).unwrap();
        assert_eq!(value["extra"], true);
        assert_eq!(value["id"], "w1");
    }
}
