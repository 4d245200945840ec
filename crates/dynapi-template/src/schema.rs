//! Binding of input documents against a template's parameter schema.

use dynapi_eval::NodePath;
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};

/// Type placeholders usable in parameter schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    String,
    Number,
    Bool,
    Object,
    List,
    Any,
}

impl Placeholder {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "<string>" => Self::String,
            "<number>" => Self::Number,
            "<bool>" => Self::Bool,
            "<object>" => Self::Object,
            "<list>" => Self::List,
            "<any>" => Self::Any,
            _ => return None,
        })
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::List => value.is_array(),
            Self::Any => true,
        }
    }

    /// Value taken when the input omits the field. Open objects and lists
    /// are concrete even when empty; scalar placeholders are dropped.
    fn absent(self) -> Option<Value> {
        match self {
            Self::Object => Some(Value::Object(Map::new())),
            Self::List => Some(Value::Array(Vec::new())),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::List => "list",
            Self::Any => "any",
        }
    }
}

/// Returns the string if `value` is a concrete string literal.
pub fn literal_str(value: &Value) -> Option<&str> {
    value
        .as_str()
        .filter(|s| Placeholder::parse(s).is_none())
}

/// Binds `input` to `schema`, returning the value stored in the parameter slot.
///
/// `None` means the field is absent from the result.
pub fn bind(schema: &Value, input: Option<&Value>, path: &NodePath) -> Result<Option<Value>> {
    if let Some(placeholder) = schema.as_str().and_then(Placeholder::parse) {
        return match input {
            Some(value) if placeholder.accepts(value) => Ok(Some(value.clone())),
            Some(value) => Err(CodecError::unmarshal(format!(
                "{path}: expected {}, got {}",
                placeholder.name(),
                type_name(value)
            ))),
            None => Ok(placeholder.absent()),
        };
    }

    match schema {
        Value::Object(fields) => {
            let input = match input {
                None => None,
                Some(Value::Object(map)) => Some(map),
                Some(other) => {
                    return Err(CodecError::unmarshal(format!(
                        "{path}: expected object, got {}",
                        type_name(other)
                    )));
                }
            };
            let mut bound = Map::new();
            for (key, field_schema) in fields {
                let field_input = input.and_then(|m| m.get(key));
                if let Some(value) = bind(field_schema, field_input, &path.field(key.clone()))? {
                    bound.insert(key.clone(), value);
                }
            }
            for (key, value) in input.into_iter().flatten() {
                if !fields.contains_key(key) {
                    bound.insert(key.clone(), value.clone());
                }
            }
            Ok(Some(Value::Object(bound)))
        }
        Value::Array(items) => match input {
            None => {
                let mut bound = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let Some(value) = bind(item, None, &path.index(i))? {
                        bound.push(value);
                    }
                }
                Ok(Some(Value::Array(bound)))
            }
            Some(Value::Array(values)) if values.len() == items.len() => {
                let mut bound = Vec::with_capacity(items.len());
                for (i, (item, value)) in items.iter().zip(values).enumerate() {
                    bound.push(bind(item, Some(value), &path.index(i))?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(bound)))
            }
            Some(Value::Array(values)) => Err(CodecError::unmarshal(format!(
                "{path}: expected list of {} items, got {}",
                items.len(),
                values.len()
            ))),
            Some(other) => Err(CodecError::unmarshal(format!(
                "{path}: expected list, got {}",
                type_name(other)
            ))),
        },
        literal => match input {
            None => Ok(Some(literal.clone())),
            Some(value) if value == literal => Ok(Some(value.clone())),
            Some(value) => Err(CodecError::unmarshal(format!(
                "{path}: conflicting values {literal} and {value}"
            ))),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
