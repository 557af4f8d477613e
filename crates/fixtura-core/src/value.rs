//! Document value model used between the transform pipeline and the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use uuid::Uuid;

/// Attribute map of a document or nested object.
pub type Attributes = BTreeMap<String, FieldValue>;

/// Identifier of a persisted entity.
///
/// Placeholder tokens use the same type so a forward reference can occupy
/// a reference field until the real entity exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single field value.
///
/// Unresolved references are plain `String`s holding a fixture name;
/// resolved ones are `Ref`. The distinction keeps the reference transform
/// idempotent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Binary(Vec<u8>),
    Ref(ObjectId),
    Array(Vec<FieldValue>),
    Object(Attributes),
}

impl FieldValue {
    /// Objects and arrays; everything else is a primitive.
    pub fn is_structured(&self) -> bool {
        matches!(self, FieldValue::Array(_) | FieldValue::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }


    pub fn as_object(&self) -> Option<&Attributes> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(value) => Value::Bool(*value),
            FieldValue::Number(value) => Value::Number(value.clone()),
            FieldValue::String(value) => Value::String(value.clone()),
            FieldValue::Binary(bytes) => {
                Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect())
            }
            FieldValue::Ref(id) => Value::String(id.to_string()),
            FieldValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            FieldValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Short, stable rendering used in log messages and dedup keys.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Binary(bytes) => format!("<{} bytes>", bytes.len()),
            other => other.to_json().to_string(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(value) => FieldValue::Bool(value),
            Value::Number(value) => FieldValue::Number(value),
            Value::String(value) => FieldValue::String(value),
            Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from).collect())
            }
            Value::Object(map) => FieldValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key, FieldValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<ObjectId> for FieldValue {
    fn from(value: ObjectId) -> Self {
        FieldValue::Ref(value)
    }
}

impl From<Attributes> for FieldValue {
    fn from(value: Attributes) -> Self {
        FieldValue::Object(value)
    }
}

/// Converts a JSON object into attributes. Non-objects yield `None`.
pub fn attributes_from_json(value: Value) -> Option<Attributes> {
    match FieldValue::from(value) {
        FieldValue::Object(map) => Some(map),
        _ => None,
    }
}

pub fn attributes_to_json(attributes: &Attributes) -> Value {
    FieldValue::Object(attributes.clone()).to_json()
}

/// Looks up a dotted path (`profile.links.0.url`).
pub fn get_path<'a>(attributes: &'a Attributes, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = attributes.get(first)?;
    for segment in segments {
        current = match current {
            FieldValue::Object(map) => map.get(segment)?,
            FieldValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a dotted path, creating intermediate objects as needed.
pub fn set_path(attributes: &mut Attributes, path: &str, value: FieldValue) {
    match path.split_once('.') {
        None => {
            attributes.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = attributes
                .entry(head.to_string())
                .or_insert_with(|| FieldValue::Object(Attributes::new()));
            if !entry.is_structured() {
                *entry = FieldValue::Object(Attributes::new());
            }
            set_nested(entry, rest, value);
        }
    }
}

fn set_nested(target: &mut FieldValue, path: &str, value: FieldValue) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    match target {
        FieldValue::Object(map) => match rest {
            None => {
                map.insert(head.to_string(), value);
            }
            Some(rest) => {
                let entry = map
                    .entry(head.to_string())
                    .or_insert_with(|| FieldValue::Object(Attributes::new()));
                if !entry.is_structured() {
                    *entry = FieldValue::Object(Attributes::new());
                }
                set_nested(entry, rest, value);
            }
        },
        FieldValue::Array(items) => {
            let Ok(index) = head.parse::<usize>() else {
                return;
            };
            if index >= items.len() {
                items.resize(index + 1, FieldValue::Null);
            }
            match rest {
                None => items[index] = value,
                Some(rest) => {
                    if !items[index].is_structured() {
                        items[index] = FieldValue::Object(Attributes::new());
                    }
                    set_nested(&mut items[index], rest, value);
                }
            }
        }
        _ => {}
    }
}

/// Removes and returns the value at a dotted path.
pub fn remove_path(attributes: &mut Attributes, path: &str) -> Option<FieldValue> {
    let Some((parent, last)) = path.rsplit_once('.') else {
        return attributes.remove(path);
    };
    let mut segments = parent.split('.');
    let mut current = attributes.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            FieldValue::Object(map) => map.get_mut(segment)?,
            FieldValue::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        FieldValue::Object(map) => map.remove(last),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_json_without_losing_structure() {
        let value = FieldValue::from(json!({"a": [1, "x", {"b": null}], "c": true}));
        let FieldValue::Object(map) = &value else {
            panic!("expected object");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(
            value.to_json(),
            json!({"a": [1, "x", {"b": null}], "c": true})
        );
    }

    #[test]
    fn refs_render_as_hex_strings() {
        let id = ObjectId::new();
        let value = FieldValue::Ref(id);
        assert_eq!(value.to_json(), Value::String(id.to_string()));
        assert_eq!(id.to_string().len(), 32);
        assert_eq!(ObjectId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn dotted_paths_walk_objects_and_arrays() {
        let mut attrs =
            attributes_from_json(json!({"roles": [{"role": "viewer"}], "name": "x"})).unwrap();
        assert_eq!(
            get_path(&attrs, "roles.0.role"),
            Some(&FieldValue::from("viewer"))
        );
        assert!(get_path(&attrs, "roles.1.role").is_none());

        set_path(&mut attrs, "roles.0.scope", FieldValue::from("global"));
        set_path(&mut attrs, "profile.bio", FieldValue::from("hi"));
        assert_eq!(
            get_path(&attrs, "roles.0.scope"),
            Some(&FieldValue::from("global"))
        );
        assert_eq!(get_path(&attrs, "profile.bio"), Some(&FieldValue::from("hi")));

        assert_eq!(remove_path(&mut attrs, "profile.bio"), Some(FieldValue::from("hi")));
        assert!(get_path(&attrs, "profile.bio").is_none());
        assert_eq!(remove_path(&mut attrs, "name"), Some(FieldValue::from("x")));
        assert_eq!(remove_path(&mut attrs, "missing.path"), None);
    }
}
