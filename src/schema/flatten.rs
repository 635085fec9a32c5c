//! Schema flattening
//!
//! Turns a nested descriptor into a dot-path → type tag map. Every proper
//! prefix of a nested path is present, tagged `Object`, unless the prefix is
//! itself an embedded-document array, which stays tagged `Array`.

use std::collections::BTreeMap;

use super::types::{FieldType, SchemaDescriptor, SchemaNode};

/// Flattened view of a schema descriptor, keyed by dot path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatSchema {
    fields: BTreeMap<String, FieldType>,
}

impl FlatSchema {
    /// Returns the declared type of a path
    pub fn get(&self, path: &str) -> Option<FieldType> {
        self.fields.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates paths in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(path, t)| (path.as_str(), *t))
    }

    /// Adds a path after flattening (e.g. a joined field)
    pub fn insert(&mut self, path: impl Into<String>, field_type: FieldType) {
        self.fields.insert(path.into(), field_type);
    }

    /// Returns the plain path → tag map
    pub fn into_map(self) -> BTreeMap<String, FieldType> {
        self.fields
    }
}

/// Flattens a schema descriptor.
///
/// Never fails: shapes that cannot be expressed simply produce no paths and
/// surface later as unknown fields.
pub fn flatten_schema(descriptor: &SchemaDescriptor) -> FlatSchema {
    let mut fields = BTreeMap::new();
    collect(descriptor, "", &mut fields);

    let ancestors: Vec<String> = fields
        .keys()
        .flat_map(|path| proper_prefixes(path))
        .collect();
    for ancestor in ancestors {
        fields.entry(ancestor).or_insert(FieldType::Object);
    }

    FlatSchema { fields }
}

fn collect(descriptor: &SchemaDescriptor, prefix: &str, out: &mut BTreeMap<String, FieldType>) {
    for (key, node) in descriptor.fields() {
        let path = make_path(prefix, key);

        match node {
            SchemaNode::Leaf(field_type) => {
                out.insert(path, *field_type);
            }
            SchemaNode::Object(nested) => collect(nested, &path, out),
            SchemaNode::ArrayOf(element) => {
                if let SchemaNode::Object(nested) = element.as_ref() {
                    collect(nested, &path, out);
                }
                out.insert(path, FieldType::Array);
            }
        }
    }
}

/// `a.b.c` → `["a", "a.b"]`
fn proper_prefixes(path: &str) -> Vec<String> {
    path.match_indices('.')
        .map(|(idx, _)| path[..idx].to_string())
        .collect()
}

fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> SchemaDescriptor {
        serde_json::from_value(json!({
            "no": "Number",
            "customer": {
                "name": "String",
                "address": { "city": "String", "zip": "String" }
            },
            "lines": [{ "sku": "String", "qty": "Number", "tags": "String[]" }],
            "placedAt": "Date",
        }))
        .unwrap()
    }

    #[test]
    fn test_leaves_are_recorded() {
        let flat = flatten_schema(&order_schema());
        assert_eq!(flat.get("no"), Some(FieldType::Number));
        assert_eq!(flat.get("placedAt"), Some(FieldType::Date));
        assert_eq!(flat.get("customer.address.zip"), Some(FieldType::String));
        assert_eq!(flat.get("lines.tags"), Some(FieldType::StringArray));
    }

    #[test]
    fn test_every_ancestor_is_an_object() {
        let flat = flatten_schema(&order_schema());
        assert_eq!(flat.get("customer"), Some(FieldType::Object));
        assert_eq!(flat.get("customer.address"), Some(FieldType::Object));
    }

    #[test]
    fn test_document_array_is_tagged_array() {
        let flat = flatten_schema(&order_schema());
        assert_eq!(flat.get("lines"), Some(FieldType::Array));
        assert_eq!(flat.get("lines.sku"), Some(FieldType::String));
    }

    #[test]
    fn test_prefix_closure_holds_for_all_paths() {
        let flat = flatten_schema(&order_schema());
        for (path, _) in flat.iter() {
            for prefix in proper_prefixes(path) {
                let tag = flat.get(&prefix);
                assert!(
                    matches!(tag, Some(FieldType::Object) | Some(FieldType::Array)),
                    "prefix {} of {} is {:?}",
                    prefix,
                    path,
                    tag
                );
            }
        }
    }

    #[test]
    fn test_array_inside_array() {
        let desc: SchemaDescriptor = serde_json::from_value(json!({
            "groups": [{ "members": [{ "uid": "ObjectID" }] }]
        }))
        .unwrap();
        let flat = flatten_schema(&desc);
        assert_eq!(flat.get("groups"), Some(FieldType::Array));
        assert_eq!(flat.get("groups.members"), Some(FieldType::Array));
        assert_eq!(flat.get("groups.members.uid"), Some(FieldType::ObjectId));
    }

    #[test]
    fn test_empty_embedded_document_produces_nothing() {
        let desc: SchemaDescriptor = serde_json::from_value(json!({ "meta": {} })).unwrap();
        assert!(flatten_schema(&desc).is_empty());
    }

    #[test]
    fn test_primitive_array_descriptor_is_array() {
        let desc: SchemaDescriptor = serde_json::from_value(json!({ "codes": ["String"] })).unwrap();
        let flat = flatten_schema(&desc);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.get("codes"), Some(FieldType::Array));
    }
}
