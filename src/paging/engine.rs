//! Paging engine
//!
//! Validates a request against its schema, plans the store calls and runs
//! them. When no pre-pipeline is supplied and page totals are wanted, the
//! data facet and the count are issued concurrently and both must succeed.

use bson::{Bson, Document};
use futures_util::future::try_join;
use tracing::{debug, warn};

use super::options::{CountOptions, QueryOptions};
use super::planner::{
    count_stage, facet_stage, limit_stage, match_stage, page_offset, project_stage, skip_stage,
    sort_stage, validate_limit, validate_paging, CountStrategy, Execution, PagePlan, DATA_BRANCH,
    METADATA_BRANCH, TOTAL_FIELD,
};
use super::result::{page_count, PageCount, PageResult};
use crate::config::EngineConfig;
use crate::errors::{QueryError, QueryResult};
use crate::filter::{validate_filter, validate_projection, ProjectionMode};
use crate::schema::{flatten_schema, FlatSchema, SchemaDescriptor};
use crate::store::{AggregateOptions, DocumentStore, StoreError};

/// Field emitted by the `$count` stage of `query_page_count`
const TOTAL_COUNT_FIELD: &str = "totalCount";

/// Schema-validated paging over a [`DocumentStore`]
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates `options` and plans the store calls for one page.
    ///
    /// # Errors
    ///
    /// `MissingSchema`, `InvalidPagingParameters`, or any filter, sort or
    /// projection validation error.
    pub fn plan(&self, pre_pipeline: &[Document], options: &QueryOptions) -> QueryResult<PagePlan> {
        validate_paging(options.page, options.limit)?;
        let schema = self.flatten(options.schema.as_ref())?;

        let page = options.page.unwrap_or(1);
        let limit = options.limit.unwrap_or(self.config.default_limit);
        validate_limit(limit)?;

        let filter = non_empty(options.filter.as_ref())
            .map(|f| validate_filter(&schema, f))
            .transpose()?;

        let mut data_stages = Vec::new();
        if let Some(sort) = non_empty(options.sort.as_ref()) {
            data_stages.push(sort_stage(validate_projection(
                &schema,
                sort,
                ProjectionMode::Sort,
            )?));
        }
        if limit > 0 {
            data_stages.push(skip_stage(page_offset(page, limit)?));
            data_stages.push(limit_stage(limit));
        }
        if let Some(project) = non_empty(options.project.as_ref()) {
            data_stages.push(project_stage(validate_projection(
                &schema,
                project,
                ProjectionMode::Project,
            )?));
        }

        let calculate_pages = options
            .calculate_pages
            .unwrap_or(self.config.calculate_pages);
        let aggregate_options = AggregateOptions {
            allow_disk_use: options.allow_disk_use.unwrap_or(self.config.allow_disk_use),
            read_preference: options
                .read_preference
                .unwrap_or(self.config.default_read_preference),
            read_concern: options
                .read_concern
                .unwrap_or(self.config.default_read_concern),
        };

        let execution = if pre_pipeline.is_empty() && !calculate_pages {
            if limit == -1 {
                Execution::Find {
                    filter: filter.unwrap_or_default(),
                }
            } else {
                let mut pipeline = Vec::with_capacity(data_stages.len() + 1);
                if let Some(filter) = filter {
                    pipeline.push(match_stage(filter));
                }
                pipeline.extend(data_stages);
                Execution::Direct { pipeline }
            }
        } else {
            let mut pipeline = pre_pipeline.to_vec();
            if let Some(filter) = &filter {
                pipeline.push(match_stage(filter.clone()));
            }

            let mut branches = vec![(DATA_BRANCH, data_stages)];
            if pre_pipeline.is_empty() {
                pipeline.push(facet_stage(branches));
                Execution::FacetedWithCount {
                    pipeline,
                    count: filter.map_or(CountStrategy::Estimated, CountStrategy::Exact),
                }
            } else {
                branches.push((METADATA_BRANCH, vec![count_stage(TOTAL_FIELD)]));
                pipeline.push(facet_stage(branches));
                Execution::Faceted { pipeline }
            }
        };

        Ok(PagePlan {
            page,
            limit,
            calculate_pages,
            options: aggregate_options,
            execution,
        })
    }

    /// Validates and runs a paged read.
    pub async fn query_page<S>(
        &self,
        store: &S,
        pre_pipeline: &[Document],
        options: &QueryOptions,
    ) -> QueryResult<PageResult>
    where
        S: DocumentStore + ?Sized,
    {
        let plan = self.plan(pre_pipeline, options)?;
        self.execute(store, &plan).await
    }

    /// Runs a previously built plan.
    pub async fn execute<S>(&self, store: &S, plan: &PagePlan) -> QueryResult<PageResult>
    where
        S: DocumentStore + ?Sized,
    {
        debug!(
            execution = plan.execution.kind(),
            page = plan.page,
            limit = plan.limit,
            "executing page plan"
        );

        let (data, total) = match &plan.execution {
            Execution::Find { filter } => {
                debug!(filter = %filter, "find");
                let data = store
                    .find(filter.clone())
                    .await
                    .map_err(|e| store_failure("find", e))?;
                (data, None)
            }
            Execution::Direct { pipeline } => {
                debug!(pipeline = ?pipeline, "aggregate");
                let data = store
                    .aggregate(pipeline.clone(), plan.options)
                    .await
                    .map_err(|e| store_failure("aggregate", e))?;
                (data, None)
            }
            Execution::Faceted { pipeline } => {
                debug!(pipeline = ?pipeline, "aggregate");
                let rows = store
                    .aggregate(pipeline.clone(), plan.options)
                    .await
                    .map_err(|e| store_failure("aggregate", e))?;
                let (data, total) = read_facet(rows, DATA_BRANCH, Some(METADATA_BRANCH))?;
                (data, Some(total.unwrap_or(0)))
            }
            Execution::FacetedWithCount { pipeline, count } => {
                debug!(pipeline = ?pipeline, count = ?count, "aggregate with concurrent count");
                let aggregate = async {
                    store
                        .aggregate(pipeline.clone(), plan.options)
                        .await
                        .map_err(|e| store_failure("aggregate", e))
                };
                let counting = async {
                    match count {
                        CountStrategy::Exact(filter) => store
                            .count_documents(filter.clone())
                            .await
                            .map_err(|e| store_failure("count_documents", e)),
                        CountStrategy::Estimated => store
                            .estimated_count()
                            .await
                            .map_err(|e| store_failure("estimated_count", e)),
                    }
                };
                let (rows, total) = try_join(aggregate, counting).await?;
                let (data, _) = read_facet(rows, DATA_BRANCH, None)?;
                (data, Some(total))
            }
        };

        Ok(PageResult {
            metadata: plan.metadata(total),
            data,
        })
    }

    /// Computes total documents and pages without fetching data.
    pub async fn query_page_count<S>(
        &self,
        store: &S,
        pre_pipeline: &[Document],
        options: &CountOptions,
    ) -> QueryResult<PageCount>
    where
        S: DocumentStore + ?Sized,
    {
        let schema = self.flatten(options.schema.as_ref())?;
        let limit = options.limit.unwrap_or(self.config.default_limit);
        validate_limit(limit)?;

        let filter = non_empty(options.filter.as_ref())
            .map(|f| validate_filter(&schema, f))
            .transpose()?;

        let total = if !pre_pipeline.is_empty() {
            let mut pipeline = pre_pipeline.to_vec();
            if let Some(filter) = filter {
                pipeline.push(match_stage(filter));
            }
            pipeline.push(count_stage(TOTAL_COUNT_FIELD));

            let aggregate_options = AggregateOptions {
                allow_disk_use: self.config.allow_disk_use,
                read_preference: options
                    .read_preference
                    .unwrap_or(self.config.default_read_preference),
                read_concern: options
                    .read_concern
                    .unwrap_or(self.config.default_read_concern),
            };
            debug!(pipeline = ?pipeline, "counting through pipeline");
            let rows = store
                .aggregate(pipeline, aggregate_options)
                .await
                .map_err(|e| store_failure("aggregate", e))?;
            rows.first()
                .and_then(|row| row.get(TOTAL_COUNT_FIELD))
                .and_then(read_count)
                .unwrap_or(0)
        } else if let Some(filter) = filter {
            store
                .count_documents(filter)
                .await
                .map_err(|e| store_failure("count_documents", e))?
        } else {
            store
                .estimated_count()
                .await
                .map_err(|e| store_failure("estimated_count", e))?
        };

        Ok(PageCount {
            total_pages: page_count(total, limit),
            total_documents: total,
        })
    }

    pub(crate) fn flatten(&self, schema: Option<&SchemaDescriptor>) -> QueryResult<FlatSchema> {
        schema
            .map(flatten_schema)
            .ok_or(QueryError::MissingSchema)
    }
}

/// Runs a paged read with the default configuration.
pub async fn query_page<S>(
    store: &S,
    pre_pipeline: &[Document],
    options: &QueryOptions,
) -> QueryResult<PageResult>
where
    S: DocumentStore + ?Sized,
{
    QueryEngine::default()
        .query_page(store, pre_pipeline, options)
        .await
}

/// Counts pages with the default configuration.
pub async fn query_page_count<S>(
    store: &S,
    pre_pipeline: &[Document],
    options: &CountOptions,
) -> QueryResult<PageCount>
where
    S: DocumentStore + ?Sized,
{
    QueryEngine::default()
        .query_page_count(store, pre_pipeline, options)
        .await
}

fn non_empty(doc: Option<&Document>) -> Option<&Document> {
    doc.filter(|d| !d.is_empty())
}

pub(crate) fn store_failure(operation: &'static str, error: StoreError) -> QueryError {
    warn!(operation, error = %error, "store call failed");
    QueryError::store(operation, error)
}

/// Splits a facet result row into its data branch and, when asked, the
/// total from its counting branch. No row means no documents.
pub(crate) fn read_facet(
    rows: Vec<Document>,
    data_branch: &str,
    count_branch: Option<&str>,
) -> QueryResult<(Vec<Document>, Option<u64>)> {
    let Some(row) = rows.into_iter().next() else {
        return Ok((Vec::new(), None));
    };

    let data = match row.get(data_branch) {
        None => Vec::new(),
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc.clone()),
                other => Err(malformed(format!(
                    "facet branch '{}' holds a non-document {:?}",
                    data_branch,
                    other.element_type()
                ))),
            })
            .collect::<QueryResult<Vec<_>>>()?,
        Some(_) => {
            return Err(malformed(format!(
                "facet branch '{}' is not an array",
                data_branch
            )))
        }
    };

    let total = count_branch.and_then(|branch| {
        row.get_array(branch)
            .ok()
            .and_then(|entries| entries.first())
            .and_then(Bson::as_document)
            .and_then(|entry| entry.get(TOTAL_FIELD))
            .and_then(read_count)
    });

    Ok((data, total))
}

fn malformed(reason: String) -> QueryError {
    QueryError::store("aggregate", StoreError::new(reason))
}

pub(crate) fn read_count(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 && n.is_finite() => Some(*n as u64),
        _ => None,
    }
}
