//! Document store boundary
//!
//! The engine talks to storage only through [`DocumentStore`]. Timeouts,
//! retries and connection lifecycle belong to the implementation.
//!
//! [`InMemoryStore`] evaluates the pipeline vocabulary the engine emits
//! against an in-process collection, so paging can be exercised without a
//! database server.

mod errors;
mod filters;
mod memory;
mod options;
mod pipeline;
mod sorter;

use async_trait::async_trait;
use bson::Document;

pub use errors::{StoreError, StoreResult};
pub use filters::MatchEvaluator;
pub use memory::{InMemoryStore, StoreCall, StoreOp};
pub use options::{AggregateOptions, ReadConcern, ReadPreference};
pub use pipeline::PipelineRunner;
pub use sorter::DocumentSorter;

/// Read operations the paging engine needs from a collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document matching `filter`
    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>>;

    /// Exact count of documents matching `filter`
    async fn count_documents(&self, filter: Document) -> StoreResult<u64>;

    /// Collection size from metadata, without a filter
    async fn estimated_count(&self) -> StoreResult<u64>;

    /// Runs an aggregation pipeline
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>>;
}
