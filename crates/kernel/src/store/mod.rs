//! Document storage.
//!
//! The query engine only needs three things from storage: collection
//! handles (by name), an aggregate capability over a [`Stage`] pipeline, and
//! document CRUD primitives. [`DocumentStore`] captures exactly that.
//!
//! Backends:
//! - [`MemoryStore`]: in-process collections, used for development and tests
//! - [`PgDocumentStore`]: PostgreSQL JSONB table, one row per document

mod memory;
pub mod pipeline;
mod postgres;

pub use memory::MemoryStore;
pub use pipeline::{Condition, MatchValue, SortDirection, SortKey, Stage};
pub use postgres::PgDocumentStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::record::Document;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("document is missing a valid _id")]
    MissingId,
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage seam used by the query engine, record service and sequence
/// generators.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a fully stamped document (must carry a valid `_id`).
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Fetch one document by identifier.
    async fn find_by_id(&self, collection: &str, id: Uuid) -> StoreResult<Option<Document>>;

    /// Replace a document wholesale. Returns false if it does not exist.
    async fn replace(&self, collection: &str, id: Uuid, doc: Document) -> StoreResult<bool>;

    /// Physically remove a document. Returns false if it did not exist.
    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<bool>;

    /// Run an aggregation pipeline over a collection.
    ///
    /// Documents enter the pipeline in insertion order.
    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> StoreResult<Vec<Value>>;

    /// Atomically increment a named counter and return the new value.
    ///
    /// The first call for a key returns 1.
    async fn increment_counter(&self, key: &str) -> StoreResult<i64>;
}
