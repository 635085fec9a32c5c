//! Paged reads through the engine against the in-memory store
//!
//! Test Categories:
//! 1. End-to-end filtering scenarios
//! 2. Round trip and limit boundaries
//! 3. Execution path selection
//! 4. Store failure propagation
//! 5. Page counting

use bson::{doc, Document};

use querygate::paging::{CountStrategy, Execution};
use querygate::store::{StoreCall, StoreOp};
use querygate::{
    query_page, query_page_count, CountOptions, EngineConfig, FieldType, InMemoryStore,
    QueryEngine, QueryError, QueryOptions, ReadPreference, SchemaDescriptor,
};

fn numbered(n: i32) -> Vec<Document> {
    (1..=n)
        .map(|no| {
            let status = if no % 2 == 0 { "even" } else { "odd" };
            doc! { "no": no, "status": status }
        })
        .collect()
}

fn numbered_schema() -> SchemaDescriptor {
    SchemaDescriptor::new()
        .field("no", FieldType::Number)
        .field("status", FieldType::String)
}

fn numbers(data: &[Document]) -> Vec<i32> {
    data.iter().map(|d| d.get_i32("no").unwrap()).collect()
}

// =============================================================================
// SCENARIOS
// =============================================================================

/// Scenario A: equality on a string field returns exactly the matching document.
#[tokio::test]
async fn test_string_equality_scenario() {
    let store = InMemoryStore::with_documents(vec![doc! { "testA": "x" }, doc! { "testA": "y" }]);
    let options = QueryOptions::new(SchemaDescriptor::new().field("testA", FieldType::String))
        .with_filter(doc! { "testA": { "$eq": "x" } });

    let page = query_page(&store, &[], &options).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].get_str("testA").unwrap(), "x");
}

/// Scenario B: a numeric range keeps only the larger document.
#[tokio::test]
async fn test_numeric_range_scenario() {
    let store = InMemoryStore::with_documents(vec![doc! { "no": 1 }, doc! { "no": 2 }]);
    let options = QueryOptions::new(SchemaDescriptor::new().field("no", FieldType::Number))
        .with_filter(doc! { "no": { "$gt": 1 } });

    let page = query_page(&store, &[], &options).await.unwrap();
    assert_eq!(numbers(&page.data), vec![2]);
    assert_eq!(page.metadata.total_documents, Some(1));
    assert_eq!(page.metadata.total_pages, Some(1));
}

/// Test: validation errors surface before any store call.
#[tokio::test]
async fn test_validation_precedes_store() {
    let store = InMemoryStore::with_documents(numbered(3));
    let options = QueryOptions::new(numbered_schema()).with_filter(doc! { "testZ": { "$eq": 1 } });

    let err = query_page(&store, &[], &options).await.unwrap_err();
    assert!(matches!(err, QueryError::UnknownField(ref f) if f == "testZ"));
    assert!(store.calls().is_empty());
}

/// Test: a request without a schema is rejected.
#[tokio::test]
async fn test_missing_schema() {
    let store = InMemoryStore::new();
    let err = query_page(&store, &[], &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::MissingSchema));
}

// =============================================================================
// ROUND TRIP AND BOUNDARIES
// =============================================================================

/// Test: N+1 documents with limit N yield N documents and two pages.
#[tokio::test]
async fn test_round_trip_two_pages() {
    for n in [1, 3, 10] {
        let store = InMemoryStore::with_documents(numbered(n + 1));
        let options = QueryOptions::new(numbered_schema())
            .with_limit(n as i64)
            .with_page(1)
            .with_sort(doc! { "no": 1 });

        let page = query_page(&store, &[], &options).await.unwrap();
        assert_eq!(page.data.len(), n as usize);
        assert_eq!(page.metadata.total_pages, Some(2));
        assert_eq!(page.metadata.total_documents, Some((n + 1) as u64));

        let last = query_page(&store, &[], &options.clone().with_page(2))
            .await
            .unwrap();
        assert_eq!(numbers(&last.data), vec![n + 1]);
    }
}

/// Test: a page whose skip offset overflows is rejected before any store call.
#[tokio::test]
async fn test_huge_page_rejected() {
    let store = InMemoryStore::with_documents(numbered(3));
    let options = QueryOptions::new(numbered_schema())
        .with_page(i64::MAX / 2)
        .with_limit(10);

    let err = query_page(&store, &[], &options).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidPagingParameters(ref m) if m == "Invalid page value"));
    assert!(err.is_validation());
    assert!(store.calls().is_empty());
}

/// Test: limit -1 with a page, and limit 0, are rejected.
#[tokio::test]
async fn test_limit_boundaries() {
    let store = InMemoryStore::with_documents(numbered(3));
    let schema = numbered_schema();

    let err = query_page(&store, &[], &QueryOptions::new(schema.clone()).with_limit(-1).with_page(1))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidPagingParameters(_)));

    for limit in [0, -2] {
        let err = query_page(&store, &[], &QueryOptions::new(schema.clone()).with_limit(limit))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid limit value");
    }
}

/// Test: a page past the end is distinguishable from an empty first page.
#[tokio::test]
async fn test_past_end_outcome() {
    let store = InMemoryStore::with_documents(numbered(3));
    let options = QueryOptions::new(numbered_schema()).with_limit(2).with_page(5);
    let page = query_page(&store, &[], &options).await.unwrap();
    assert!(page.outcome().is_past_end());

    let empty = QueryOptions::new(numbered_schema()).with_filter(doc! { "no": 99 });
    let page = query_page(&store, &[], &empty).await.unwrap();
    assert_eq!(page.metadata.total_pages, Some(0));
    assert!(!page.outcome().is_past_end());
}

// =============================================================================
// EXECUTION PATHS
// =============================================================================

/// Test: fetch-all without counting is a single find.
#[tokio::test]
async fn test_fetch_all_uses_find() {
    let store = InMemoryStore::with_documents(numbered(4));
    let options = QueryOptions::new(numbered_schema())
        .with_limit(-1)
        .with_calculate_pages(false)
        .with_filter(doc! { "status": "odd" });

    let page = query_page(&store, &[], &options).await.unwrap();
    assert_eq!(numbers(&page.data), vec![1, 3]);
    assert_eq!(page.metadata.page_size, -1);
    assert_eq!(page.metadata.total_pages, None);
    assert_eq!(
        store.calls(),
        vec![StoreCall::Find {
            filter: doc! { "status": "odd" }
        }]
    );
}

/// Test: without counting, one aggregate returns the page directly.
#[tokio::test]
async fn test_direct_pipeline_order() {
    let store = InMemoryStore::with_documents(numbered(5));
    let options = QueryOptions::new(numbered_schema())
        .with_limit(2)
        .with_page(2)
        .with_calculate_pages(false)
        .with_sort(doc! { "no": -1 })
        .with_project(doc! { "no": 1 })
        .with_filter(doc! { "no": { "$lte": 4 } });

    let page = query_page(&store, &[], &options).await.unwrap();
    assert_eq!(numbers(&page.data), vec![2, 1]);
    assert!(page.data.iter().all(|d| !d.contains_key("status")));

    let calls = store.calls();
    let StoreCall::Aggregate { pipeline, .. } = &calls[0] else {
        panic!("expected aggregate");
    };
    let stages: Vec<&str> = pipeline
        .iter()
        .map(|s| s.keys().next().unwrap().as_str())
        .collect();
    assert_eq!(stages, vec!["$match", "$sort", "$skip", "$limit", "$project"]);
}

/// Test: counted reads issue the facet and an exact count together.
#[tokio::test]
async fn test_counted_read_issues_count() {
    let store = InMemoryStore::with_documents(numbered(5));
    let options = QueryOptions::new(numbered_schema())
        .with_filter(doc! { "status": "odd" })
        .with_read_preference(ReadPreference::Primary);

    let page = query_page(&store, &[], &options).await.unwrap();
    assert_eq!(page.metadata.total_documents, Some(3));

    let calls = store.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().any(|c| matches!(
        c,
        StoreCall::Aggregate { options, .. } if options.read_preference == ReadPreference::Primary
    )));
    assert!(calls.contains(&StoreCall::CountDocuments {
        filter: doc! { "status": "odd" }
    }));
}

/// Test: an unfiltered counted read uses the estimated count.
#[tokio::test]
async fn test_unfiltered_read_estimates() {
    let engine = QueryEngine::default();
    let plan = engine.plan(&[], &QueryOptions::new(numbered_schema())).unwrap();
    assert!(matches!(
        plan.execution,
        Execution::FacetedWithCount {
            count: CountStrategy::Estimated,
            ..
        }
    ));

    let store = InMemoryStore::with_documents(numbered(12));
    let page = engine.execute(&store, &plan).await.unwrap();
    assert_eq!(page.data.len(), 10);
    assert_eq!(page.metadata.total_pages, Some(2));
    assert!(store.calls().contains(&StoreCall::EstimatedCount));
}

/// Test: a caller pre-pipeline is counted inside the facet.
#[tokio::test]
async fn test_pre_pipeline_counts_in_facet() {
    let store = InMemoryStore::with_documents(vec![
        doc! { "order": 1, "lines": [ { "sku": "a", "qty": 1 }, { "sku": "b", "qty": 4 } ] },
        doc! { "order": 2, "lines": [ { "sku": "c", "qty": 7 } ] },
    ]);
    let schema = SchemaDescriptor::new().field("sku", FieldType::String).field("qty", FieldType::Number);
    let pre = vec![
        doc! { "$unwind": { "path": "$lines" } },
        doc! { "$replaceRoot": { "newRoot": "$lines" } },
    ];
    let options = QueryOptions::new(schema)
        .with_filter(doc! { "qty": { "$gte": 2 } })
        .with_limit(1)
        .with_sort(doc! { "qty": 1 });

    let page = query_page(&store, &pre, &options).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].get_str("sku").unwrap(), "b");
    assert_eq!(page.metadata.total_documents, Some(2));
    assert_eq!(page.metadata.total_pages, Some(2));
    assert_eq!(store.calls().len(), 1);
}

/// Test: engine configuration supplies unset options.
#[tokio::test]
async fn test_config_defaults_apply() {
    let engine = QueryEngine::new(EngineConfig {
        default_limit: 3,
        calculate_pages: false,
        ..EngineConfig::default()
    });
    let store = InMemoryStore::with_documents(numbered(5));

    let page = engine
        .query_page(&store, &[], &QueryOptions::new(numbered_schema()))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 3);
    assert_eq!(page.metadata.page_size, 3);
    assert_eq!(page.metadata.total_documents, None);
}

// =============================================================================
// STORE FAILURES
// =============================================================================

/// Test: driver failures are wrapped, never reported as validation errors.
#[tokio::test]
async fn test_store_failure_wrapped() {
    let store = InMemoryStore::with_documents(numbered(3));
    store.fail_with("connection reset");

    let err = query_page(&store, &[], &QueryOptions::new(numbered_schema()))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::StoreExecution { .. }));
    assert!(!err.is_validation());
    assert_eq!(err.code(), "QG_STORE_EXECUTION_FAILURE");
    assert!(err.to_string().contains("connection reset"));

    store.recover();
    assert!(query_page(&store, &[], &QueryOptions::new(numbered_schema()))
        .await
        .is_ok());
}

/// Test: a failing exact count fails the read even though the data facet succeeded.
#[tokio::test]
async fn test_count_failure_fails_page() {
    let store = InMemoryStore::with_documents(numbered(5));
    store.fail_on(StoreOp::CountDocuments, "count timed out");
    let options = QueryOptions::new(numbered_schema()).with_filter(doc! { "status": "odd" });

    let err = query_page(&store, &[], &options).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::StoreExecution {
            operation: "count_documents",
            ..
        }
    ));
    assert!(err.to_string().contains("count timed out"));

    let calls = store.calls();
    assert!(calls.iter().any(|c| matches!(c, StoreCall::Aggregate { .. })));
    assert!(calls.iter().any(|c| matches!(c, StoreCall::CountDocuments { .. })));
}

/// Test: a failing estimated count fails an unfiltered read.
#[tokio::test]
async fn test_estimated_count_failure_fails_page() {
    let store = InMemoryStore::with_documents(numbered(5));
    store.fail_on(StoreOp::EstimatedCount, "metadata unavailable");

    let err = query_page(&store, &[], &QueryOptions::new(numbered_schema()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::StoreExecution {
            operation: "estimated_count",
            ..
        }
    ));
}

/// Test: a failing data facet fails the read even though the count succeeded.
#[tokio::test]
async fn test_aggregate_failure_fails_page() {
    let store = InMemoryStore::with_documents(numbered(5));
    store.fail_on(StoreOp::Aggregate, "cursor killed");
    let options = QueryOptions::new(numbered_schema()).with_filter(doc! { "status": "odd" });

    let err = query_page(&store, &[], &options).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::StoreExecution {
            operation: "aggregate",
            ..
        }
    ));
}

/// Test: unsupported pipeline content is a store failure, not a validation error.
#[tokio::test]
async fn test_unsupported_operator_in_store() {
    let store = InMemoryStore::with_documents(vec![doc! { "name": "coffee" }]);
    let options = QueryOptions::new(SchemaDescriptor::new().field("name", FieldType::String))
        .with_filter(doc! { "$text": { "$search": "coffee" } });

    let err = query_page(&store, &[], &options).await.unwrap_err();
    assert!(matches!(err, QueryError::StoreExecution { .. }));
}

// =============================================================================
// PAGE COUNTING
// =============================================================================

/// Test: counts with and without filters and pre-pipelines.
#[tokio::test]
async fn test_page_count() {
    let store = InMemoryStore::with_documents(numbered(7));

    let counted = query_page_count(&store, &[], &CountOptions::new(numbered_schema()).with_limit(3))
        .await
        .unwrap();
    assert_eq!((counted.total_pages, counted.total_documents), (3, 7));

    let filtered = CountOptions::new(numbered_schema())
        .with_filter(doc! { "status": "even" })
        .with_limit(2);
    let counted = query_page_count(&store, &[], &filtered).await.unwrap();
    assert_eq!((counted.total_pages, counted.total_documents), (2, 3));

    let pre = vec![doc! { "$match": { "no": { "$gt": 5 } } }];
    let counted = query_page_count(&store, &pre, &CountOptions::new(numbered_schema()))
        .await
        .unwrap();
    assert_eq!((counted.total_pages, counted.total_documents), (1, 2));
}

/// Test: the fetch-everything sentinel counts as a single page.
#[tokio::test]
async fn test_page_count_sentinel() {
    let store = InMemoryStore::with_documents(numbered(25));
    let counted = query_page_count(&store, &[], &CountOptions::new(numbered_schema()).with_limit(-1))
        .await
        .unwrap();
    assert_eq!(counted.total_pages, 1);
    assert_eq!(counted.total_documents, 25);

    let empty = InMemoryStore::new();
    let pre = vec![doc! { "$match": { "no": 1 } }];
    let counted = query_page_count(&empty, &pre, &CountOptions::new(numbered_schema()))
        .await
        .unwrap();
    assert_eq!(counted.total_documents, 0);
    assert_eq!(
        empty.calls()[0],
        StoreCall::Aggregate {
            pipeline: vec![doc! { "$match": { "no": 1 } }, doc! { "$count": "totalCount" }],
            options: Default::default(),
        }
    );
}
