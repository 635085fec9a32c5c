//! Pipeline planning
//!
//! A [`PagePlan`] is the fully validated description of one paged read:
//! which store calls to make, with which pipelines and options, and how to
//! derive the page metadata from their results. Planning never touches the
//! store.

use bson::{Bson, Document};
use serde_json::{json, Value};

use super::result::{page_count, PageMetadata};
use crate::errors::{QueryError, QueryResult};
use crate::store::AggregateOptions;

/// Key of the facet branch holding the page of documents
pub const DATA_BRANCH: &str = "data";
/// Key of the counting facet branch
pub const METADATA_BRANCH: &str = "metadata";
/// Field emitted by the counting branch's `$count` stage
pub const TOTAL_FIELD: &str = "total";

const LOOKUP_KEYS: [&str; 4] = ["from", "localField", "foreignField", "as"];

/// How the total document count is obtained alongside the data pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum CountStrategy {
    /// `count_documents` with the validated filter
    Exact(Document),
    /// Collection metadata count, used when there is no filter
    Estimated,
}

/// Store calls for one page
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Fetch-everything fast path: one filtered find, no count
    Find { filter: Document },
    /// One pipeline returning the page directly, no count
    Direct { pipeline: Vec<Document> },
    /// Pre-pipeline followed by a facet whose `metadata` branch counts
    Faceted { pipeline: Vec<Document> },
    /// Facet for data plus a concurrently issued count
    FacetedWithCount {
        pipeline: Vec<Document>,
        count: CountStrategy,
    },
}

impl Execution {
    pub fn kind(&self) -> &'static str {
        match self {
            Execution::Find { .. } => "find",
            Execution::Direct { .. } => "direct",
            Execution::Faceted { .. } => "faceted",
            Execution::FacetedWithCount { .. } => "facetedWithCount",
        }
    }
}

/// A validated, ready-to-run paged read
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub page: i64,
    pub limit: i64,
    pub calculate_pages: bool,
    pub options: AggregateOptions,
    pub execution: Execution,
}

impl PagePlan {
    /// Builds page metadata from the total count, if one was obtained.
    ///
    /// The fetch-everything sentinel reports `pageSize` -1 on the direct
    /// paths and 1 on the faceted paths.
    pub fn metadata(&self, total: Option<u64>) -> PageMetadata {
        let fetch_all = self.limit == -1;
        let page_size = match (&self.execution, fetch_all) {
            (Execution::Find { .. } | Execution::Direct { .. }, true) => -1,
            (_, true) => 1,
            (_, false) => self.limit,
        };
        let current_page = if fetch_all { 1 } else { self.page };

        let totals = match (&self.execution, self.calculate_pages) {
            (Execution::Faceted { .. } | Execution::FacetedWithCount { .. }, true) => {
                let total = total.unwrap_or(0);
                Some((page_count(total, self.limit), total))
            }
            _ => None,
        };

        PageMetadata {
            page_size,
            current_page,
            total_pages: totals.map(|(pages, _)| pages),
            total_documents: totals.map(|(_, total)| total),
        }
    }

    /// JSON rendering for inspection tools
    pub fn describe(&self) -> Value {
        let mut out = json!({
            "execution": self.execution.kind(),
            "page": self.page,
            "limit": self.limit,
            "calculatePages": self.calculate_pages,
            "options": serde_json::to_value(self.options).unwrap_or_default(),
        });

        match &self.execution {
            Execution::Find { filter } => {
                out["filter"] = document_json(filter);
            }
            Execution::Direct { pipeline } | Execution::Faceted { pipeline } => {
                out["pipeline"] = pipeline_json(pipeline);
            }
            Execution::FacetedWithCount { pipeline, count } => {
                out["pipeline"] = pipeline_json(pipeline);
                out["count"] = match count {
                    CountStrategy::Exact(filter) => json!({ "exact": document_json(filter) }),
                    CountStrategy::Estimated => json!("estimated"),
                };
            }
        }
        out
    }
}

fn document_json(doc: &Document) -> Value {
    Bson::Document(doc.clone()).into_relaxed_extjson()
}

pub(crate) fn pipeline_json(pipeline: &[Document]) -> Value {
    Value::Array(pipeline.iter().map(document_json).collect())
}

/// Checks a `limit`/`page` pair.
pub(crate) fn validate_paging(page: Option<i64>, limit: Option<i64>) -> QueryResult<()> {
    if let Some(limit) = limit {
        if limit == -1 && page.is_some() {
            return Err(QueryError::InvalidPagingParameters(
                "Cannot allow page when limit is -1".to_string(),
            ));
        }
        validate_limit(limit)?;
    }
    if let Some(page) = page {
        if page < 1 {
            return Err(QueryError::InvalidPagingParameters(
                "Invalid page value".to_string(),
            ));
        }
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: i64) -> QueryResult<()> {
    if limit == 0 || limit < -1 {
        return Err(QueryError::InvalidPagingParameters(
            "Invalid limit value".to_string(),
        ));
    }
    Ok(())
}

/// Documents to skip before `page`, rejecting pages whose offset overflows.
pub(crate) fn page_offset(page: i64, limit: i64) -> QueryResult<i64> {
    (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| QueryError::InvalidPagingParameters("Invalid page value".to_string()))
}

/// Checks a `{$lookup: {...}}` stage and returns its `as` field.
///
/// # Errors
///
/// `MalformedLookup` naming `$lookup` when the key is absent, or naming
/// every absent sub-field.
pub(crate) fn validate_lookup(stage: &Document) -> QueryResult<String> {
    let body = match stage.get("$lookup") {
        Some(Bson::Document(body)) => body,
        _ => return Err(QueryError::MalformedLookup(vec!["$lookup".to_string()])),
    };

    let missing: Vec<String> = LOOKUP_KEYS
        .iter()
        .filter(|key| !body.contains_key(*key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(QueryError::MalformedLookup(missing));
    }

    body.get_str("as")
        .map(str::to_string)
        .map_err(|_| QueryError::MalformedLookup(vec!["as".to_string()]))
}

// ==================
// Stage builders
// ==================

fn stage(name: &str, body: impl Into<Bson>) -> Document {
    let mut doc = Document::new();
    doc.insert(name, body);
    doc
}

pub(crate) fn match_stage(filter: Document) -> Document {
    stage("$match", filter)
}

pub(crate) fn sort_stage(sort: Document) -> Document {
    stage("$sort", sort)
}

pub(crate) fn project_stage(project: Document) -> Document {
    stage("$project", project)
}

pub(crate) fn skip_stage(skip: i64) -> Document {
    stage("$skip", skip)
}

pub(crate) fn limit_stage(limit: i64) -> Document {
    stage("$limit", limit)
}

pub(crate) fn count_stage(field: &str) -> Document {
    stage("$count", field)
}

/// `{$unwind: {path: "$<field>"}}`
pub(crate) fn unwind_stage(field: &str) -> Document {
    let mut body = Document::new();
    body.insert("path", field_ref(field));
    stage("$unwind", body)
}

/// `{$replaceRoot: {newRoot: "$<field>"}}`
pub(crate) fn replace_root_stage(field: &str) -> Document {
    let mut body = Document::new();
    body.insert("newRoot", field_ref(field));
    stage("$replaceRoot", body)
}

pub(crate) fn facet_stage(branches: Vec<(&str, Vec<Document>)>) -> Document {
    let mut body = Document::new();
    for (name, stages) in branches {
        body.insert(name, stages);
    }
    stage("$facet", body)
}

fn field_ref(field: &str) -> String {
    if field.starts_with('$') {
        field.to_string()
    } else {
        format!("${}", field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_paging_boundaries() {
        assert!(validate_paging(None, None).is_ok());
        assert!(validate_paging(Some(3), Some(10)).is_ok());
        assert!(validate_paging(None, Some(-1)).is_ok());

        let err = validate_paging(Some(1), Some(-1)).unwrap_err();
        assert_eq!(err.to_string(), "Cannot allow page when limit is -1");

        for limit in [0, -2, -50] {
            let err = validate_paging(None, Some(limit)).unwrap_err();
            assert_eq!(err.to_string(), "Invalid limit value");
        }

        let err = validate_paging(Some(0), Some(10)).unwrap_err();
        assert_eq!(err.code(), "QG_INVALID_PAGING_PARAMETERS");
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10).unwrap(), 0);
        assert_eq!(page_offset(4, 25).unwrap(), 75);

        let err = page_offset(i64::MAX / 2, 10).unwrap_err();
        assert_eq!(err.to_string(), "Invalid page value");
    }

    #[test]
    fn test_lookup_validation() {
        let stage = doc! { "$lookup": { "localField": "a", "foreignField": "b", "as": "c" } };
        let err = validate_lookup(&stage).unwrap_err();
        assert!(matches!(err, QueryError::MalformedLookup(ref f) if f == &vec!["from".to_string()]));

        let err = validate_lookup(&doc! { "$lookup": {} }).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Missing field : ["from","localField","foreignField","as"]"#
        );

        let err = validate_lookup(&doc! { "lookup": {} }).unwrap_err();
        assert!(matches!(err, QueryError::MalformedLookup(ref f) if f[0] == "$lookup"));

        let ok = doc! { "$lookup": { "from": "x", "localField": "a", "foreignField": "b", "as": "joined" } };
        assert_eq!(validate_lookup(&ok).unwrap(), "joined");
    }

    #[test]
    fn test_stage_shapes() {
        assert_eq!(unwind_stage("lines"), doc! { "$unwind": { "path": "$lines" } });
        assert_eq!(replace_root_stage("$lines"), doc! { "$replaceRoot": { "newRoot": "$lines" } });
        assert_eq!(
            facet_stage(vec![
                (DATA_BRANCH, vec![skip_stage(0), limit_stage(10)]),
                (METADATA_BRANCH, vec![count_stage(TOTAL_FIELD)]),
            ]),
            doc! {
                "$facet": {
                    "data": [ { "$skip": 0_i64 }, { "$limit": 10_i64 } ],
                    "metadata": [ { "$count": "total" } ]
                }
            }
        );
    }

    fn plan(execution: Execution, limit: i64, calculate_pages: bool) -> PagePlan {
        PagePlan {
            page: 2,
            limit,
            calculate_pages,
            options: AggregateOptions::default(),
            execution,
        }
    }

    #[test]
    fn test_metadata_sentinels() {
        let find = plan(Execution::Find { filter: doc! {} }, -1, false);
        let meta = find.metadata(None);
        assert_eq!((meta.page_size, meta.current_page), (-1, 1));
        assert_eq!(meta.total_pages, None);

        let faceted = plan(
            Execution::FacetedWithCount {
                pipeline: vec![],
                count: CountStrategy::Estimated,
            },
            -1,
            true,
        );
        let meta = faceted.metadata(Some(42));
        assert_eq!((meta.page_size, meta.current_page), (1, 1));
        assert_eq!(meta.total_pages, Some(1));
        assert_eq!(meta.total_documents, Some(42));
    }

    #[test]
    fn test_metadata_totals() {
        let faceted = plan(Execution::Faceted { pipeline: vec![] }, 5, true);
        let meta = faceted.metadata(Some(11));
        assert_eq!(meta.page_size, 5);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.total_pages, Some(3));

        let uncounted = plan(Execution::Faceted { pipeline: vec![] }, 5, false);
        assert_eq!(uncounted.metadata(Some(11)).total_documents, None);
    }

    #[test]
    fn test_describe_names_execution() {
        let described = plan(
            Execution::FacetedWithCount {
                pipeline: vec![match_stage(doc! { "no": 1 })],
                count: CountStrategy::Exact(doc! { "no": 1 }),
            },
            10,
            true,
        )
        .describe();
        assert_eq!(described["execution"], "facetedWithCount");
        assert_eq!(described["pipeline"][0]["$match"]["no"], 1);
        assert_eq!(described["count"]["exact"]["no"], 1);
        assert_eq!(described["options"]["readPreference"], "secondaryPreferred");
    }
}
