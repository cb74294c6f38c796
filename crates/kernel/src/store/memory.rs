//! In-memory document store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::pipeline::{self, Collections, Stage};
use super::{DocumentStore, StoreError, StoreResult};
use crate::record::{Document, document_id};

/// Collections held in process memory.
///
/// Each collection is a `Vec` so documents keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    counters: RwLock<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn snapshot(&self, name: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(name)
            .map(|docs| docs.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        if document_id(&doc).is_none() {
            return Err(StoreError::MissingId);
        }
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Option<Document>> {
        Ok(self.collections.read().get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| document_id(doc) == Some(id))
                .cloned()
        }))
    }

    async fn replace(&self, collection: &str, id: Uuid, doc: Document) -> StoreResult<bool> {
        let mut collections = self.collections.write();
        let Some(slot) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| document_id(d) == Some(id)))
        else {
            return Ok(false);
        };
        *slot = doc;
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<bool> {
        let mut collections = self.collections.write();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|doc| document_id(doc) != Some(id));
        Ok(docs.len() != before)
    }

    async fn aggregate(&self, collection: &str, stages: &[Stage]) -> StoreResult<Vec<Value>> {
        let input = self.snapshot(collection);
        let joined: Collections = pipeline::lookup_targets(stages)
            .into_iter()
            .map(|name| {
                let docs = self.snapshot(&name);
                (name, docs)
            })
            .collect();

        pipeline::evaluate(input, stages, &joined)
    }

    async fn increment_counter(&self, key: &str) -> StoreResult<i64> {
        let mut counters = self.counters.write();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
