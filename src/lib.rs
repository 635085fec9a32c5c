//! querygate - schema-validated queries and paged aggregation
//!
//! Callers describe a collection once as a [`SchemaDescriptor`]. Filters,
//! sorts and projections arriving from untrusted requests are checked
//! against it, operand values are coerced to the declared types, and paged
//! reads are planned as find/aggregate calls on a [`DocumentStore`].

pub mod cli;
pub mod config;
pub mod document;
pub mod errors;
pub mod filter;
pub mod observability;
pub mod paging;
pub mod schema;
pub mod store;

pub use config::{ConfigError, EngineConfig, LoggingConfig};
pub use errors::{QueryError, QueryResult};
pub use filter::{validate_filter, validate_projection, Operator, ProjectionMode};
pub use paging::{
    get_data_with_paging, query_page, query_page_count, CountOptions, LegacyPageRequest,
    PageCount, PageMetadata, PageOutcome, PageResult, QueryEngine, QueryOptions,
};
pub use schema::{flatten_schema, FieldType, FlatSchema, SchemaDescriptor};
pub use store::{AggregateOptions, DocumentStore, InMemoryStore, ReadConcern, ReadPreference};
