//! Expected response shapes.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::mapping::{self, MappingOptions};

/// Scalar types a payload can be passed through as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    /// Any JSON value.
    Any,
    /// A string; other values become their JSON text.
    String,
    /// A number; numeric strings are parsed.
    Number,
    /// A boolean; `"true"` and `"false"` are accepted.
    Boolean,
    /// Nothing; the payload is dropped.
    Void,
}

impl ScalarKind {
    fn coerce(self, payload: Value) -> Value {
        match (self, payload) {
            (Self::Any, payload) => payload,
            (Self::Void, _) => Value::Null,
            (Self::String, Value::String(s)) => Value::String(s),
            (Self::String, other) => Value::String(other.to_string()),
            (Self::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n).map_or(Value::String(s), Value::Number),
                Err(_) => Value::String(s),
            },
            (Self::Boolean, Value::String(s)) => match s.trim() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(s),
            },
            (_, payload) => payload,
        }
    }
}

/// How a response payload should be turned into the caller's value.
///
/// Chosen at the call site through the shape selectors of
/// [`Request`](super::Request).
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseShape {
    /// No transformation; the payload is returned as the given scalar.
    Passthrough(ScalarKind),
    /// Decode a new value of the target type.
    Construct,
    /// Merge the payload into this snapshot of an existing instance.
    Instance(Value),
    /// Apply the inner shape to every element of a sequence payload.
    ArrayOf(Box<ResponseShape>),
    /// A shape given as a plain value. Always rejected.
    Untyped(Value),
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self::Passthrough(ScalarKind::Any)
    }
}

impl ResponseShape {
    /// Whether this shape skips transformation (and the `TransformEnd` event).
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }

    /// Transform `payload` according to this shape.
    pub(crate) fn transform(&self, payload: Value, options: &MappingOptions) -> Result<Value> {
        match self {
            Self::Passthrough(kind) => Ok(kind.coerce(payload)),
            Self::Construct => Ok(options.apply_to_typed(payload)),
            Self::Instance(existing) => Ok(mapping::populate_existing(
                existing.clone(),
                options.apply_to_typed(payload),
            )),
            Self::ArrayOf(inner) => match payload {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| inner.transform(item, options))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(Error::InvalidResponseShape(format!(
                    "expected a sequence payload, got {}",
                    kind_of(&other)
                ))),
            },
            Self::Untyped(value) => Err(Error::InvalidResponseShape(format!(
                "entity should be either a type or an instance, got {}",
                kind_of(value)
            ))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
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
    use serde_json::json;

    fn none() -> MappingOptions {
        MappingOptions::default()
    }

    #[test]
    fn test_passthrough_coercion() {
        let string = ResponseShape::Passthrough(ScalarKind::String);
        assert_eq!(string.transform(json!(""), &none()).unwrap(), json!(""));
        assert_eq!(string.transform(json!({"a": 1}), &none()).unwrap(), json!("{\"a\":1}"));

        let number = ResponseShape::Passthrough(ScalarKind::Number);
        assert_eq!(number.transform(json!("42"), &none()).unwrap(), json!(42.0));
        assert_eq!(number.transform(json!(7), &none()).unwrap(), json!(7));

        let boolean = ResponseShape::Passthrough(ScalarKind::Boolean);
        assert_eq!(boolean.transform(json!("true"), &none()).unwrap(), json!(true));

        let void = ResponseShape::Passthrough(ScalarKind::Void);
        assert_eq!(void.transform(json!({}), &none()).unwrap(), Value::Null);
    }

    #[test]
    fn test_instance_merges_payload() {
        let shape = ResponseShape::Instance(json!({"id": null, "title": "draft", "body": null}));
        let out = shape
            .transform(json!({"id": 101, "body": "text"}), &none())
            .unwrap();
        assert_eq!(out, json!({"id": 101, "title": "draft", "body": "text"}));
    }

    #[test]
    fn test_array_of_requires_sequence() {
        let shape = ResponseShape::ArrayOf(Box::new(ResponseShape::Construct));
        assert_eq!(
            shape.transform(json!([{"id": 1}, {"id": 2}]), &none()).unwrap(),
            json!([{"id": 1}, {"id": 2}])
        );

        let err = shape.transform(json!({"id": 1}), &none()).unwrap_err();
        assert!(matches!(err, Error::InvalidResponseShape(_)));
    }

    #[test]
    fn test_array_of_instances_merges_each_element() {
        let shape = ResponseShape::ArrayOf(Box::new(ResponseShape::Instance(json!({
            "id": null,
            "seen": false
        }))));
        let out = shape.transform(json!([{"id": 1}, {"id": 2}]), &none()).unwrap();
        assert_eq!(
            out,
            json!([{"id": 1, "seen": false}, {"id": 2, "seen": false}])
        );
    }

    #[test]
    fn test_untyped_is_rejected() {
        let err = ResponseShape::Untyped(json!(3))
            .transform(json!({"id": 1}), &none())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponseShape(msg) if msg.contains("a number")));
    }
}
