//! Paged reads
//!
//! [`QueryEngine`] validates a paging request against its schema, plans the
//! store calls and assembles the page with its metadata. The legacy entry
//! point in [`get_data_with_paging`] serves callers that still hand over raw
//! stage bodies.

mod engine;
mod legacy;
mod options;
mod planner;
mod result;

pub use engine::{query_page, query_page_count, QueryEngine};
pub use legacy::{get_data_with_paging, LegacyPageRequest};
pub use options::{CountOptions, QueryOptions};
pub use planner::{CountStrategy, Execution, PagePlan, DATA_BRANCH, METADATA_BRANCH, TOTAL_FIELD};
pub use result::{PageCount, PageMetadata, PageOutcome, PageResult};
