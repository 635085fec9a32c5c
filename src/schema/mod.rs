//! Schema descriptors and flattening
//!
//! A caller describes a collection's document shape once as a
//! `SchemaDescriptor`; every validation call flattens it into a
//! `FlatSchema` (dot path → type tag) that the filter and projection
//! validators consult.

mod flatten;
mod types;

pub use flatten::{flatten_schema, FlatSchema};
pub use types::{FieldType, SchemaDescriptor, SchemaNode};
