//! Schema descriptor types
//!
//! Supported leaf tags:
//! - `String`, `Number`, `Boolean`, `Date`, `ObjectID`
//! - `String[]`, `Number[]`, `ObjectID[]`
//! - `Array`, `Object` (also produced by flattening)
//!
//! A descriptor is written as JSON: a string is a leaf tag, an object is an
//! embedded document, a one-element array is an embedded-document array.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Primitive type tag of a schema path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    #[serde(rename = "ObjectID")]
    ObjectId,
    #[serde(rename = "String[]")]
    StringArray,
    #[serde(rename = "Number[]")]
    NumberArray,
    #[serde(rename = "ObjectID[]")]
    ObjectIdArray,
    /// Array of embedded documents
    Array,
    /// Embedded document, or ancestor of a nested path
    Object,
}

impl FieldType {
    /// Every tag, in declaration order
    pub const ALL: [FieldType; 10] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::ObjectId,
        FieldType::StringArray,
        FieldType::NumberArray,
        FieldType::ObjectIdArray,
        FieldType::Array,
        FieldType::Object,
    ];

    /// Returns the tag as written in descriptors and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::Number => "Number",
            FieldType::Boolean => "Boolean",
            FieldType::Date => "Date",
            FieldType::ObjectId => "ObjectID",
            FieldType::StringArray => "String[]",
            FieldType::NumberArray => "Number[]",
            FieldType::ObjectIdArray => "ObjectID[]",
            FieldType::Array => "Array",
            FieldType::Object => "Object",
        }
    }

    /// Parses a tag; unknown tags yield `None`
    pub fn parse(tag: &str) -> Option<Self> {
        FieldType::ALL.into_iter().find(|t| t.type_name() == tag)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One node of a schema descriptor tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    Leaf(FieldType),
    Object(SchemaDescriptor),
    /// Embedded-document array; the element is usually an `Object`
    ArrayOf(Box<SchemaNode>),
}

impl SchemaNode {
    /// Converts a JSON descriptor node. Unrecognized shapes yield `None`
    /// and are dropped by the enclosing object.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(tag) => FieldType::parse(tag).map(SchemaNode::Leaf),
            Value::Object(map) => Some(SchemaNode::Object(SchemaDescriptor::from_map(map))),
            Value::Array(items) => {
                let element = match items.first() {
                    Some(first) => SchemaNode::from_json(first)?,
                    None => SchemaNode::Object(SchemaDescriptor::new()),
                };
                Some(SchemaNode::ArrayOf(Box::new(element)))
            }
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            SchemaNode::Leaf(t) => Value::String(t.type_name().to_string()),
            SchemaNode::Object(desc) => desc.to_json(),
            SchemaNode::ArrayOf(element) => Value::Array(vec![element.to_json()]),
        }
    }
}

/// Caller-owned description of a collection's document shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct SchemaDescriptor {
    fields: BTreeMap<String, SchemaNode>,
}

impl SchemaDescriptor {
    /// Create an empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), SchemaNode::Leaf(field_type));
        self
    }

    /// Add an embedded document
    pub fn object(mut self, name: impl Into<String>, nested: SchemaDescriptor) -> Self {
        self.fields.insert(name.into(), SchemaNode::Object(nested));
        self
    }

    /// Add an embedded-document array
    pub fn array_of(mut self, name: impl Into<String>, element: SchemaDescriptor) -> Self {
        self.fields.insert(
            name.into(),
            SchemaNode::ArrayOf(Box::new(SchemaNode::Object(element))),
        );
        self
    }

    /// Top-level fields of this descriptor
    pub fn fields(&self) -> &BTreeMap<String, SchemaNode> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .filter_map(|(key, value)| SchemaNode::from_json(value).map(|node| (key.clone(), node)))
            .collect();
        Self { fields }
    }

    fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(key, node)| (key.clone(), node.to_json()))
                .collect(),
        )
    }
}

impl TryFrom<Value> for SchemaDescriptor {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(format!(
                "schema descriptor must be an object, got {}",
                json_type_name(other)
            )),
        }
    }
}

impl From<SchemaDescriptor> for Value {
    fn from(desc: SchemaDescriptor) -> Self {
        desc.to_json()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_round_trips_through_tag() {
        for t in FieldType::ALL {
            assert_eq!(FieldType::parse(t.type_name()), Some(t));
        }
        assert_eq!(FieldType::parse("Mixed"), None);
    }

    #[test]
    fn test_descriptor_from_json() {
        let desc: SchemaDescriptor = serde_json::from_value(json!({
            "name": "String",
            "address": { "city": "String" },
            "items": [{ "sku": "String", "qty": "Number" }],
        }))
        .unwrap();

        let expected = SchemaDescriptor::new()
            .field("name", FieldType::String)
            .object("address", SchemaDescriptor::new().field("city", FieldType::String))
            .array_of(
                "items",
                SchemaDescriptor::new()
                    .field("sku", FieldType::String)
                    .field("qty", FieldType::Number),
            );
        assert_eq!(desc, expected);
    }

    #[test]
    fn test_unknown_tags_are_dropped() {
        let desc: SchemaDescriptor =
            serde_json::from_value(json!({ "a": "Mixed", "b": 12, "c": "Date" })).unwrap();
        assert_eq!(desc.fields().len(), 1);
        assert!(desc.fields().contains_key("c"));
    }

    #[test]
    fn test_non_object_root_rejected() {
        let result: Result<SchemaDescriptor, _> = serde_json::from_value(json!(["String"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_descriptor_serializes_back() {
        let desc = SchemaDescriptor::new()
            .field("tags", FieldType::StringArray)
            .array_of("lines", SchemaDescriptor::new().field("no", FieldType::Number));
        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(value, json!({ "tags": "String[]", "lines": [{ "no": "Number" }] }));
    }
}
