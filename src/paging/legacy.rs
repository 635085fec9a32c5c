//! First-generation paging entry point
//!
//! Kept for callers that build their own stages. Everything runs as one
//! `$facet` aggregation with a `_metadata` counting branch and a `data`
//! branch. Shaping modes, highest precedence first:
//!
//! 1. lookup: join, match, unwind the joined field, optional projection
//! 2. sub-resource: project and unwind an embedded array, promote each
//!    element to the root, then match
//! 3. projection with unwind, optionally with an extra match after it
//! 4. projection only
//! 5. plain match
//!
//! The filter is validated through the same matrix as [`QueryEngine::plan`],
//! scoped under the resource path in sub-resource mode. In lookup mode it
//! refers to joined fields and is passed through unvalidated. Sort, project,
//! extra match and lookup stage bodies are trusted.

use bson::Document;
use tracing::debug;

use super::engine::{read_facet, store_failure, QueryEngine};
use super::planner::{
    count_stage, facet_stage, limit_stage, match_stage, page_offset, project_stage,
    replace_root_stage, skip_stage, sort_stage, unwind_stage, validate_lookup, TOTAL_FIELD,
};
use super::result::{page_count, PageMetadata, PageOutcome, PageResult};
use crate::errors::{QueryError, QueryResult};
use crate::filter::validate_filter_scoped;
use crate::schema::SchemaDescriptor;
use crate::store::{AggregateOptions, DocumentStore};

const LEGACY_METADATA_BRANCH: &str = "_metadata";
const LEGACY_DATA_BRANCH: &str = "data";

/// Request for [`QueryEngine::get_data_with_paging`]
#[derive(Debug, Clone, Default)]
pub struct LegacyPageRequest {
    pub schema: SchemaDescriptor,
    pub filter: Option<Document>,
    /// 0 means the first page
    pub page: i64,
    /// 0 means the configured default
    pub limit: i64,
    /// `$sort` body
    pub sort: Option<Document>,
    /// `$project` body
    pub project: Option<Document>,
    /// Array field to unwind after projecting
    pub unwind: Option<String>,
    /// `$match` body applied after unwinding
    pub extra_match: Option<Document>,
    /// Embedded array whose elements become the paged documents
    pub resource: Option<String>,
    /// Full `{$lookup: {...}}` stage
    pub lookup: Option<Document>,
}

impl LegacyPageRequest {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_project(mut self, project: Document) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_unwind(mut self, path: impl Into<String>) -> Self {
        self.unwind = Some(path.into());
        self
    }

    pub fn with_extra_match(mut self, filter: Document) -> Self {
        self.extra_match = Some(filter);
        self
    }

    pub fn with_resource(mut self, path: impl Into<String>) -> Self {
        self.resource = Some(path.into());
        self
    }

    pub fn with_lookup(mut self, stage: Document) -> Self {
        self.lookup = Some(stage);
        self
    }
}

/// Facet branches for a legacy request
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LegacyFacet {
    pub metadata: Vec<Document>,
    pub data: Vec<Document>,
}

impl QueryEngine {
    /// Runs a first-generation paged read.
    ///
    /// Returns [`PageOutcome::PastEnd`] when a page after the first is
    /// empty, and [`PageOutcome::Empty`] with `totalPages` 1 when the first
    /// page is.
    pub async fn get_data_with_paging<S>(
        &self,
        store: &S,
        request: &LegacyPageRequest,
    ) -> QueryResult<PageOutcome>
    where
        S: DocumentStore + ?Sized,
    {
        let (page, limit) = self.legacy_paging(request)?;
        let facet = self.legacy_facet(request, page, limit)?;

        let pipeline = vec![facet_stage(vec![
            (LEGACY_METADATA_BRANCH, facet.metadata),
            (LEGACY_DATA_BRANCH, facet.data),
        ])];
        debug!(pipeline = ?pipeline, "legacy paging aggregate");

        let options = AggregateOptions {
            allow_disk_use: self.config().allow_disk_use,
            read_preference: self.config().default_read_preference,
            read_concern: self.config().default_read_concern,
        };
        let rows = store
            .aggregate(pipeline, options)
            .await
            .map_err(|e| store_failure("aggregate", e))?;
        let (data, total) = read_facet(rows, LEGACY_DATA_BRANCH, Some(LEGACY_METADATA_BRANCH))?;

        if data.is_empty() {
            if page > 1 {
                return Ok(PageOutcome::PastEnd);
            }
            return Ok(PageOutcome::Empty(PageResult {
                metadata: PageMetadata {
                    page_size: limit,
                    current_page: page,
                    total_pages: Some(1),
                    total_documents: None,
                },
                data,
            }));
        }

        Ok(PageOutcome::Page(PageResult {
            metadata: PageMetadata {
                page_size: limit,
                current_page: page,
                total_pages: Some(page_count(total.unwrap_or(0), limit)),
                total_documents: None,
            },
            data,
        }))
    }

    fn legacy_paging(&self, request: &LegacyPageRequest) -> QueryResult<(i64, i64)> {
        let page = if request.page == 0 { 1 } else { request.page };
        if page < 1 {
            return Err(QueryError::InvalidPagingParameters(
                "Invalid page value".to_string(),
            ));
        }

        let limit = if request.limit == 0 {
            self.config().default_limit
        } else {
            request.limit
        };
        if limit < 1 {
            return Err(QueryError::InvalidPagingParameters(
                "Invalid limit value".to_string(),
            ));
        }
        Ok((page, limit))
    }

    pub(crate) fn legacy_facet(
        &self,
        request: &LegacyPageRequest,
        page: i64,
        limit: i64,
    ) -> QueryResult<LegacyFacet> {
        let lookup_as = request.lookup.as_ref().map(validate_lookup).transpose()?;

        let filter = match (&request.filter, lookup_as.is_some()) {
            (Some(filter), true) => filter.clone(),
            (Some(filter), false) => {
                let schema = self.flatten(Some(&request.schema))?;
                validate_filter_scoped(&schema, filter, request.resource.as_deref())?
            }
            (None, _) => Document::new(),
        };

        let matcher = match_stage(filter);
        let sort = request.sort.clone().map(sort_stage);
        let page_stages = [skip_stage(page_offset(page, limit)?), limit_stage(limit)];
        let count = count_stage(TOTAL_FIELD);

        let mut metadata = Vec::new();
        let mut data = Vec::new();

        if let (Some(lookup), Some(joined)) = (&request.lookup, &lookup_as) {
            metadata.extend([lookup.clone(), matcher.clone(), count]);

            data.extend([lookup.clone(), matcher, unwind_stage(joined)]);
            data.extend(request.project.clone().map(project_stage));
            data.extend(sort);
        } else if let Some(resource) = &request.resource {
            let project = request
                .project
                .clone()
                .unwrap_or_else(|| resource_projection(resource));
            let shaping = [
                project_stage(project),
                unwind_stage(request.unwind.as_deref().unwrap_or(resource)),
                replace_root_stage(resource),
                matcher,
            ];

            metadata.extend(shaping.iter().cloned());
            metadata.push(count);

            data.extend(shaping);
            data.extend(sort);
        } else if let Some(project) = &request.project {
            data.extend(sort);
            match &request.unwind {
                Some(path) => {
                    let tail = match &request.extra_match {
                        Some(extra) => match_stage(extra.clone()),
                        None => replace_root_stage(path),
                    };
                    let shaping = [
                        matcher,
                        project_stage(project.clone()),
                        unwind_stage(path),
                        tail,
                    ];
                    metadata.extend(shaping.iter().cloned());
                    data.extend(shaping);
                }
                None => {
                    let shaping = [matcher, project_stage(project.clone())];
                    metadata.extend(shaping.iter().cloned());
                    data.extend(shaping);
                }
            }
            metadata.push(count);
        } else {
            metadata.extend([matcher.clone(), count]);
            data.extend(sort);
            data.push(matcher);
        }

        data.extend(page_stages);
        Ok(LegacyFacet { metadata, data })
    }
}

/// `{_id: 0, <resource>: 1}`
fn resource_projection(resource: &str) -> Document {
    let mut project = Document::new();
    project.insert("_id", 0);
    project.insert(resource, 1);
    project
}

/// Runs a first-generation paged read with the default configuration.
pub async fn get_data_with_paging<S>(
    store: &S,
    request: &LegacyPageRequest,
) -> QueryResult<PageOutcome>
where
    S: DocumentStore + ?Sized,
{
    QueryEngine::default()
        .get_data_with_paging(store, request)
        .await
}
