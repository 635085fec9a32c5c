//! Paging request options

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaDescriptor;
use crate::store::{ReadConcern, ReadPreference};

/// Options for [`QueryEngine::query_page`](super::QueryEngine::query_page).
///
/// Unset fields fall back to the engine's [`EngineConfig`](crate::config::EngineConfig).
/// `schema` is mandatory at execution time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    pub schema: Option<SchemaDescriptor>,
    pub filter: Option<Document>,
    pub sort: Option<Document>,
    pub project: Option<Document>,
    /// 1-based page number; must be absent when `limit` is -1
    pub page: Option<i64>,
    /// Page size, or -1 to fetch everything
    pub limit: Option<i64>,
    pub calculate_pages: Option<bool>,
    pub allow_disk_use: Option<bool>,
    #[serde(alias = "readPref")]
    pub read_preference: Option<ReadPreference>,
    pub read_concern: Option<ReadConcern>,
}

impl QueryOptions {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
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

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_calculate_pages(mut self, calculate: bool) -> Self {
        self.calculate_pages = Some(calculate);
        self
    }

    pub fn with_allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = Some(allow);
        self
    }

    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    pub fn with_read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }
}

/// Options for [`QueryEngine::query_page_count`](super::QueryEngine::query_page_count)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountOptions {
    pub schema: Option<SchemaDescriptor>,
    pub filter: Option<Document>,
    pub limit: Option<i64>,
    #[serde(alias = "readPref")]
    pub read_preference: Option<ReadPreference>,
    pub read_concern: Option<ReadConcern>,
}

impl CountOptions {
    pub fn new(schema: SchemaDescriptor) -> Self {
        Self {
            schema: Some(schema),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        self.read_preference = Some(preference);
        self
    }

    pub fn with_read_concern(mut self, concern: ReadConcern) -> Self {
        self.read_concern = Some(concern);
        self
    }
}
