//! Page results and metadata

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub page_size: i64,
    pub current_page: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_documents: Option<u64>,
}

/// One page of documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(rename = "_metadata")]
    pub metadata: PageMetadata,
    pub data: Vec<Document>,
}

impl PageResult {
    /// Classifies the page: documents, a valid empty page, or past the end.
    pub fn outcome(self) -> PageOutcome {
        if !self.data.is_empty() {
            PageOutcome::Page(self)
        } else if self.metadata.current_page > 1 {
            PageOutcome::PastEnd
        } else {
            PageOutcome::Empty(self)
        }
    }

    /// Renders the page as relaxed extended JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let data: Vec<serde_json::Value> = self
            .data
            .iter()
            .map(|doc| Bson::Document(doc.clone()).into_relaxed_extjson())
            .collect();
        serde_json::json!({
            "_metadata": serde_json::to_value(&self.metadata).unwrap_or_default(),
            "data": data,
        })
    }
}

/// Tri-state page classification
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// At least one document
    Page(PageResult),
    /// No documents on the first page
    Empty(PageResult),
    /// Requested page lies beyond the last one
    PastEnd,
}

impl PageOutcome {
    pub fn is_past_end(&self) -> bool {
        matches!(self, PageOutcome::PastEnd)
    }

    /// Returns the page for `Page` and `Empty`
    pub fn into_result(self) -> Option<PageResult> {
        match self {
            PageOutcome::Page(page) | PageOutcome::Empty(page) => Some(page),
            PageOutcome::PastEnd => None,
        }
    }
}

/// Totals returned by `query_page_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCount {
    pub total_pages: i64,
    pub total_documents: u64,
}

/// `ceil(total / limit)`, or 1 for the fetch-everything sentinel
pub(crate) fn page_count(total: u64, limit: i64) -> i64 {
    if limit < 1 {
        return 1;
    }
    let limit = limit as u64;
    (total.div_ceil(limit)) as i64
}
