//! In-memory document store
//!
//! Holds one primary collection plus named side collections for `$lookup`.
//! Every call is recorded before it runs so callers can assert on the exact
//! filters and pipelines they sent. Failures can be injected for every call
//! or for a single operation to exercise error paths.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use bson::Document;

use super::errors::{StoreError, StoreResult};
use super::filters::MatchEvaluator;
use super::options::AggregateOptions;
use super::pipeline::PipelineRunner;
use super::DocumentStore;

/// A call received by [`InMemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Find {
        filter: Document,
    },
    CountDocuments {
        filter: Document,
    },
    EstimatedCount,
    Aggregate {
        pipeline: Vec<Document>,
        options: AggregateOptions,
    },
}

impl StoreCall {
    pub fn op(&self) -> StoreOp {
        match self {
            StoreCall::Find { .. } => StoreOp::Find,
            StoreCall::CountDocuments { .. } => StoreOp::CountDocuments,
            StoreCall::EstimatedCount => StoreOp::EstimatedCount,
            StoreCall::Aggregate { .. } => StoreOp::Aggregate,
        }
    }
}

/// Store operation targeted by [`InMemoryStore::fail_on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Find,
    CountDocuments,
    EstimatedCount,
    Aggregate,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<Vec<Document>>,
    collections: RwLock<HashMap<String, Vec<Document>>>,
    calls: Mutex<Vec<StoreCall>>,
    failure: Mutex<Option<String>>,
    op_failures: Mutex<HashMap<StoreOp, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Appends a document to the primary collection
    pub fn insert(&self, document: Document) -> StoreResult<()> {
        self.documents
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(document);
        Ok(())
    }

    /// Registers a side collection that `$lookup` stages can join against
    pub fn insert_collection(
        &self,
        name: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> StoreResult<()> {
        self.collections
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(name.into(), documents.into_iter().collect());
        Ok(())
    }

    /// Number of documents in the primary collection
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.documents.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes every subsequent call fail with `message` until [`recover`]
    ///
    /// [`recover`]: InMemoryStore::recover
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Makes only calls to `op` fail with `message`; other operations keep working.
    pub fn fail_on(&self, op: StoreOp, message: impl Into<String>) {
        self.op_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, message.into());
    }

    /// Clears every injected failure
    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.op_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, call: StoreCall) -> StoreResult<()> {
        let op = call.op();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Err(StoreError::new(message.clone()));
        }
        match self
            .op_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
        {
            Some(message) => Err(StoreError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn matching(&self, filter: &Document) -> StoreResult<Vec<Document>> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        let mut out = Vec::new();
        for doc in documents.iter() {
            if MatchEvaluator::matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find(&self, filter: Document) -> StoreResult<Vec<Document>> {
        self.record(StoreCall::Find {
            filter: filter.clone(),
        })?;
        self.matching(&filter)
    }

    async fn count_documents(&self, filter: Document) -> StoreResult<u64> {
        self.record(StoreCall::CountDocuments {
            filter: filter.clone(),
        })?;
        Ok(self.matching(&filter)?.len() as u64)
    }

    async fn estimated_count(&self) -> StoreResult<u64> {
        self.record(StoreCall::EstimatedCount)?;
        Ok(self.len()? as u64)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>> {
        self.record(StoreCall::Aggregate {
            pipeline: pipeline.clone(),
            options,
        })?;

        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .clone();
        let collections = self.collections.read().map_err(|_| StoreError::Poisoned)?;
        PipelineRunner::new(&collections).run(documents, &pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn store() -> InMemoryStore {
        InMemoryStore::with_documents(vec![
            doc! { "no": 1, "status": "open" },
            doc! { "no": 2, "status": "closed" },
            doc! { "no": 3, "status": "open" },
        ])
    }

    #[tokio::test]
    async fn test_find_and_count() {
        let store = store();
        let found = store.find(doc! { "status": "open" }).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.count_documents(doc! { "no": { "$gt": 1 } }).await.unwrap(), 2);
        assert_eq!(store.estimated_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let store = store();
        store.find(doc! { "no": 1 }).await.unwrap();
        store
            .aggregate(vec![doc! { "$limit": 1 }], AggregateOptions::default())
            .await
            .unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], StoreCall::Find { filter: doc! { "no": 1 } });
        assert!(matches!(calls[1], StoreCall::Aggregate { ref pipeline, .. } if pipeline.len() == 1));

        store.clear_calls();
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = store();
        store.fail_with("connection reset");
        let err = store.estimated_count().await.unwrap_err();
        assert_eq!(err, StoreError::new("connection reset"));

        store.recover();
        assert!(store.estimated_count().await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_on_single_operation() {
        let store = store();
        store.fail_on(StoreOp::CountDocuments, "count timed out");

        let err = store.count_documents(doc! {}).await.unwrap_err();
        assert_eq!(err, StoreError::new("count timed out"));
        assert!(store.find(doc! {}).await.is_ok());
        assert!(store.estimated_count().await.is_ok());

        store.recover();
        assert!(store.count_documents(doc! {}).await.is_ok());
    }

    #[tokio::test]
    async fn test_lookup_uses_side_collection() {
        let store = store();
        store
            .insert_collection("statuses", vec![doc! { "code": "open", "label": "Open" }])
            .unwrap();
        let out = store
            .aggregate(
                vec![doc! { "$lookup": { "from": "statuses", "localField": "status", "foreignField": "code", "as": "s" } }],
                AggregateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out[0].get_array("s").unwrap().len(), 1);
        assert!(out[1].get_array("s").unwrap().is_empty());
    }

    #[test]
    fn test_insert_grows_collection() {
        let store = InMemoryStore::new();
        assert!(store.is_empty().unwrap());
        store.insert(doc! { "no": 1 }).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
