//! CRUD service shared by every entity.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::EntityDefinition;
use crate::query::{ListParams, QueryEngine, QueryResult, QuerySpec};
use crate::record::{Document, apply_update, parse_id, stamp_new};
use crate::store::{DocumentStore, StoreError};

/// Errors raised by [`RecordService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("{entity} record {id} not found")]
    NotFound { entity: String, id: String },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One page of records plus optional statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    #[serde(flatten)]
    pub result: QueryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Value>,
}

/// Create, read, update, delete and list for one entity.
#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn DocumentStore>,
    definition: Arc<EntityDefinition>,
    engine: QueryEngine,
}

impl RecordService {
    pub fn new(store: Arc<dyn DocumentStore>, definition: EntityDefinition) -> Self {
        let engine = QueryEngine::new(store.clone(), definition.schema.clone());
        Self {
            store,
            definition: Arc::new(definition),
            engine,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    fn collection(&self) -> &str {
        &self.definition.schema.collection
    }

    fn parse(&self, raw: &str) -> Result<Uuid, ServiceError> {
        parse_id(raw).ok_or_else(|| ServiceError::InvalidId(raw.to_string()))
    }

    fn not_found(&self, raw: &str) -> ServiceError {
        ServiceError::NotFound {
            entity: self.name().to_string(),
            id: raw.to_string(),
        }
    }

    fn into_document(payload: Value) -> Result<Document, ServiceError> {
        match payload {
            Value::Object(map) => Ok(map),
            _ => Err(ServiceError::Validation(
                "payload must be a JSON object".to_string(),
            )),
        }
    }

    /// Stamp and persist a new record.
    pub async fn create(&self, payload: Value) -> Result<Document, ServiceError> {
        let doc = stamp_new(Self::into_document(payload)?);
        let stored = self.store.insert(self.collection(), doc).await?;
        info!(entity = %self.name(), id = ?stored.get("_id"), "record created");
        Ok(stored)
    }

    pub async fn get(&self, raw_id: &str) -> Result<Document, ServiceError> {
        let id = self.parse(raw_id)?;
        self.store
            .find_by_id(self.collection(), id)
            .await?
            .ok_or_else(|| self.not_found(raw_id))
    }

    /// Merge `payload` into the stored record.
    pub async fn update(&self, raw_id: &str, payload: Value) -> Result<Document, ServiceError> {
        let id = self.parse(raw_id)?;
        let patch = Self::into_document(payload)?;

        let mut doc = self
            .store
            .find_by_id(self.collection(), id)
            .await?
            .ok_or_else(|| self.not_found(raw_id))?;
        apply_update(&mut doc, patch);

        if !self.store.replace(self.collection(), id, doc.clone()).await? {
            return Err(self.not_found(raw_id));
        }
        debug!(entity = %self.name(), %id, "record updated");
        Ok(doc)
    }

    /// Remove the record permanently.
    pub async fn delete(&self, raw_id: &str) -> Result<(), ServiceError> {
        let id = self.parse(raw_id)?;
        if !self.store.delete(self.collection(), id).await? {
            return Err(self.not_found(raw_id));
        }
        info!(entity = %self.name(), %id, "record deleted");
        Ok(())
    }

    /// Filtered, searched, paginated listing.
    pub async fn list(&self, params: &ListParams) -> Result<ListPage, ServiceError> {
        let spec = QuerySpec::from_params(&self.definition.schema, params);
        let result = self.engine.run(&spec).await?;

        let statistics = match (&self.definition.statistics, params.include_stats) {
            (Some(provider), true) => Some(
                provider
                    .collect(self.store.as_ref(), self.collection(), &spec.match_filters)
                    .await?,
            ),
            _ => None,
        };

        Ok(ListPage { result, statistics })
    }
}
