//! Declarative output schemas for JSON stages.
//!
//! A schema is a small tree of [`SchemaNode`]s. It validates untrusted replies
//! (required fields, types, nested structures) and renders itself as JSON
//! Schema so repair prompts can restate the contract verbatim.
use serde_json::{json, Map, Value};
use std::fmt;

/// Expected shape of one JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Any JSON value; shape is left to the normalizer.
    Any,
    String,
    Integer,
    /// Integer, or a string holding one (`"2"`); prompts still ask for integers.
    IntegerLike,
    Number,
    Boolean,
    Array(Box<SchemaNode>),
    /// Object with arbitrary keys whose values share one shape.
    Map(Box<SchemaNode>),
    Object(Vec<Field>),
    /// Accepts a value matching any of the alternatives.
    AnyOf(Vec<SchemaNode>),
}

/// A named member of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub node: SchemaNode,
    pub required: bool,
}

impl Field {
    pub fn required(name: &'static str, node: SchemaNode) -> Self {
        Self {
            name,
            node,
            required: true,
        }
    }

    pub fn optional(name: &'static str, node: SchemaNode) -> Self {
        Self {
            name,
            node,
            required: false,
        }
    }
}

impl SchemaNode {
    pub fn array(item: SchemaNode) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn map(value: SchemaNode) -> Self {
        Self::Map(Box::new(value))
    }

    fn type_name(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::String => "string".to_string(),
            Self::Integer | Self::IntegerLike => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Array(_) => "array".to_string(),
            Self::Map(_) | Self::Object(_) => "object".to_string(),
            Self::AnyOf(options) => options
                .iter()
                .map(Self::type_name)
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let mismatch = || SchemaViolation::TypeMismatch {
            path: path.to_string(),
            expected: self.type_name(),
            found: json_type_name(value),
        };
        match self {
            Self::Any => Ok(()),
            Self::String => value.is_string().then_some(()).ok_or_else(mismatch),
            Self::Integer => (value.is_i64() || value.is_u64())
                .then_some(())
                .ok_or_else(mismatch),
            Self::IntegerLike => {
                let integral = match value {
                    Value::String(text) => text.trim().parse::<i64>().is_ok(),
                    other => other.is_i64() || other.is_u64(),
                };
                integral.then_some(()).ok_or_else(mismatch)
            }
            Self::Number => value.is_number().then_some(()).ok_or_else(mismatch),
            Self::Boolean => value.is_boolean().then_some(()).ok_or_else(mismatch),
            Self::Array(item) => {
                let items = value.as_array().ok_or_else(mismatch)?;
                for (idx, entry) in items.iter().enumerate() {
                    item.validate_at(entry, &format!("{path}[{idx}]"))?;
                }
                Ok(())
            }
            Self::Map(inner) => {
                let object = value.as_object().ok_or_else(mismatch)?;
                for (key, entry) in object {
                    inner.validate_at(entry, &format!("{path}.{key}"))?;
                }
                Ok(())
            }
            Self::Object(fields) => {
                let object = value.as_object().ok_or_else(mismatch)?;
                for field in fields {
                    let child_path = format!("{path}.{}", field.name);
                    match object.get(field.name) {
                        None | Some(Value::Null) if field.required => {
                            return Err(SchemaViolation::MissingField {
                                path: path.to_string(),
                                field: field.name,
                            });
                        }
                        None | Some(Value::Null) => {}
                        Some(entry) => field.node.validate_at(entry, &child_path)?,
                    }
                }
                Ok(())
            }
            Self::AnyOf(options) => {
                if options.iter().any(|option| option.validate_at(value, path).is_ok()) {
                    return Ok(());
                }
                // Report against the alternative of the same JSON type, if any.
                match options
                    .iter()
                    .find(|option| option.type_name() == json_type_name(value))
                {
                    Some(option) => option.validate_at(value, path),
                    None => Err(mismatch()),
                }
            }
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::String | Self::Integer | Self::IntegerLike | Self::Number | Self::Boolean => {
                json!({ "type": self.type_name() })
            }
            Self::AnyOf(options) => json!({
                "anyOf": options.iter().map(Self::to_json_schema).collect::<Vec<_>>(),
            }),
            Self::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            Self::Map(inner) => json!({
                "type": "object",
                "additionalProperties": inner.to_json_schema(),
            }),
            Self::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    properties.insert(field.name.to_string(), field.node.to_json_schema());
                    if field.required {
                        required.push(Value::String(field.name.to_string()));
                    }
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
        }
    }
}

/// Expected output shape of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    pub name: &'static str,
    pub root: SchemaNode,
}

impl ExtractionSchema {
    pub fn new(name: &'static str, root: SchemaNode) -> Self {
        Self { name, root }
    }

    /// Check a parsed reply against the schema, reporting the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.root.validate_at(value, "$")
    }

    /// Top-level field names, required ones first. For alternatives, the
    /// first object alternative is listed.
    pub fn fields(&self) -> Vec<(&'static str, bool)> {
        let object = match &self.root {
            SchemaNode::AnyOf(options) => options
                .iter()
                .find(|option| matches!(option, SchemaNode::Object(_))),
            root => Some(root),
        };
        let Some(SchemaNode::Object(fields)) = object else {
            return Vec::new();
        };
        let mut names: Vec<_> = fields.iter().map(|f| (f.name, f.required)).collect();
        names.sort_by_key(|(_, required)| !required);
        names
    }

    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.root.to_json_schema();
        if let Value::Object(object) = &mut schema {
            object.insert("title".to_string(), Value::String(self.name.to_string()));
        }
        schema
    }

    /// Pretty JSON Schema text embedded in prompts.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_schema())
            .unwrap_or_else(|_| format!("{{\"title\": \"{}\"}}", self.name))
    }
}

/// First structural mismatch found while validating a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    MissingField {
        path: String,
        field: &'static str,
    },
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { path, field } => {
                write!(f, "at {path}: missing required field `{field}`")
            }
            Self::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "at {path}: expected {expected}, found {found}"),
        }
    }
}

impl std::error::Error for SchemaViolation {}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
