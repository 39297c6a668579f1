//! Conversion between typed values and plain JSON payloads.
//!
//! Typed values travel through `serde`: request bodies are serialized to a
//! [`serde_json::Value`] and response payloads are deserialized from one.
//! Per-field rules belong on the types themselves (`#[serde(rename)]`,
//! `#[serde(skip)]`, ...). [`MappingOptions`] adds the call-site rules on top:
//! excluding fields, excluding by prefix, renaming, and group membership.
//!
//! Rules are applied to every object level of the payload, nested objects
//! and array elements included.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Result;

/// Call-site mapping rules.
///
/// Field names are the names used by the Rust type (after its own serde
/// attributes). A rename maps such a field to the name used on the wire.
///
/// # Example
///
/// ```ignore
/// let options = MappingOptions::new()
///     .rename("user_id", "userId")
///     .exclude("password")
///     .field_groups("email", ["admin"])
///     .groups(["admin"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MappingOptions {
    groups: Vec<String>,
    field_groups: HashMap<String, Vec<String>>,
    excluded: Vec<String>,
    exclude_prefixes: Vec<String>,
    renames: Vec<(String, String)>,
}

impl MappingOptions {
    /// Options with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active groups.
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict `field` to the given groups.
    ///
    /// A grouped field is kept only while one of its groups is active.
    pub fn field_groups<I, S>(mut self, field: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_groups
            .insert(field.into(), groups.into_iter().map(Into::into).collect());
        self
    }

    /// Always drop `field`.
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded.push(field.into());
        self
    }

    /// Drop every field whose name starts with `prefix`.
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exclude_prefixes.push(prefix.into());
        self
    }

    /// Expose `field` under `name` on the wire.
    pub fn rename(mut self, field: impl Into<String>, name: impl Into<String>) -> Self {
        self.renames.push((field.into(), name.into()));
        self
    }

    /// Whether these options change anything.
    pub fn is_empty(&self) -> bool {
        self.field_groups.is_empty()
            && self.excluded.is_empty()
            && self.exclude_prefixes.is_empty()
            && self.renames.is_empty()
    }

    fn keeps(&self, field: &str) -> bool {
        if self.excluded.iter().any(|it| it == field) {
            return false;
        }
        if self
            .exclude_prefixes
            .iter()
            .any(|prefix| field.starts_with(prefix.as_str()))
        {
            return false;
        }
        match self.field_groups.get(field) {
            Some(groups) => groups.iter().any(|g| self.groups.contains(g)),
            None => true,
        }
    }

    fn wire_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| from == field)
            .map_or(field, |(_, to)| to.as_str())
    }

    fn field_name<'a>(&'a self, wire: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(_, to)| to == wire)
            .map_or(wire, |(from, _)| from.as_str())
    }

    /// Apply the rules to a payload leaving the process.
    pub fn apply_to_plain(&self, value: Value) -> Value {
        if self.is_empty() {
            return value;
        }
        self.walk(value, Direction::ToPlain)
    }

    /// Apply the rules to a payload entering the process.
    pub fn apply_to_typed(&self, value: Value) -> Value {
        if self.is_empty() {
            return value;
        }
        self.walk(value, Direction::ToTyped)
    }

    fn walk(&self, value: Value, direction: Direction) -> Value {
        match value {
            Value::Object(object) => {
                let mut mapped = Map::with_capacity(object.len());
                for (key, inner) in object {
                    let field = match direction {
                        Direction::ToPlain => key.as_str(),
                        Direction::ToTyped => self.field_name(&key),
                    };
                    if !self.keeps(field) {
                        continue;
                    }
                    let name = match direction {
                        Direction::ToPlain => self.wire_name(field).to_string(),
                        Direction::ToTyped => field.to_string(),
                    };
                    mapped.insert(name, self.walk(inner, direction));
                }
                Value::Object(mapped)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item, direction))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    ToPlain,
    ToTyped,
}

/// Convert a typed value to a plain payload.
pub fn to_plain<T: Serialize + ?Sized>(value: &T, options: &MappingOptions) -> Result<Value> {
    Ok(options.apply_to_plain(serde_json::to_value(value)?))
}

/// Build a new typed value from a plain payload.
pub fn from_plain<T: DeserializeOwned>(payload: Value, options: &MappingOptions) -> Result<T> {
    Ok(serde_json::from_value(options.apply_to_typed(payload))?)
}

/// Merge `payload` into `existing`.
///
/// Object fields present in the payload overwrite those of `existing`, nested
/// objects are merged recursively, and fields the payload lacks keep their
/// current value. A payload that is not an object replaces `existing`.
pub fn populate_existing(existing: Value, payload: Value) -> Value {
    match (existing, payload) {
        (Value::Object(mut target), Value::Object(source)) => {
            for (key, value) in source {
                let merged = match target.remove(&key) {
                    Some(current) => populate_existing(current, value),
                    None => value,
                };
                target.insert(key, merged);
            }
            Value::Object(target)
        }
        (_, payload) => payload,
    }
}
