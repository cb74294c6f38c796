//! Query engine: filtering, relation expansion, search, counting and paging.
//!
//! One engine instance serves one entity. The entity's [`QuerySchema`] is
//! fixed at construction; each call supplies a [`QuerySpec`] (usually built
//! from request parameters) and gets back the total plus one page.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::filter::{FilterField, normalize_filters};
use super::params::ListParams;
use super::relation::{RelationRef, expand_relations};
use super::search::search_stages;
use crate::record::ID_FIELD;
use crate::store::pipeline::pipeline_to_json;
use crate::store::{Condition, DocumentStore, SortKey, Stage, StoreResult};

const COUNT_FIELD: &str = "total";

/// Static query configuration for one entity.
#[derive(Debug, Clone, Default)]
pub struct QuerySchema {
    pub collection: String,
    /// Relations expanded on every list call, in order.
    pub relations: Vec<RelationRef>,
    /// Dotted paths searched by the `search` parameter.
    pub search_fields: Vec<String>,
    /// Declared filter parameters.
    pub filters: Vec<FilterField>,
}

impl QuerySchema {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Self::default()
        }
    }

    pub fn relations(mut self, relations: Vec<RelationRef>) -> Self {
        self.relations = relations;
        self
    }

    pub fn search_fields(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn filters(mut self, filters: Vec<FilterField>) -> Self {
        self.filters = filters;
        self
    }
}

/// One retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    /// Conditions combined with AND. Normally includes `isDeleted = false`.
    pub match_filters: Vec<Condition>,
    pub relations: Vec<RelationRef>,
    pub search_term: Option<String>,
    pub search_fields: Vec<String>,
    pub sort: SortKey,
    /// 1-indexed page number.
    pub page: u64,
    pub limit: u64,
    /// Return every matched record, ignoring `page`/`limit`.
    pub bypass_pagination: bool,
}

impl QuerySpec {
    /// Build a query from list parameters and an entity schema.
    pub fn from_params(schema: &QuerySchema, params: &ListParams) -> Self {
        Self {
            match_filters: normalize_filters(&schema.filters, &params.filters),
            relations: schema.relations.clone(),
            search_term: params.search.clone(),
            search_fields: schema.search_fields.clone(),
            sort: SortKey::new(params.sort_by.clone(), params.order),
            page: params.page.max(1),
            limit: params.limit.max(1),
            bypass_pagination: params.bypass_pagination,
        }
    }
}

/// Total plus one page of records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub data: Vec<Value>,
}

/// Shared stages: match → relations → search/dedupe → sort.
pub fn base_stages(spec: &QuerySpec) -> Vec<Stage> {
    let mut stages = vec![Stage::Match(Condition::And(spec.match_filters.clone()))];
    stages.extend(expand_relations(&spec.relations));
    if let Some(term) = &spec.search_term {
        stages.extend(search_stages(term, &spec.search_fields));
    }

    let mut keys = vec![spec.sort.clone()];
    if spec.sort.field != ID_FIELD {
        keys.push(SortKey::new(ID_FIELD, spec.sort.direction));
    }
    stages.push(Stage::Sort(keys));

    stages
}

/// Pipeline producing `{ total: n }` (or nothing when n is zero).
pub fn count_pipeline(spec: &QuerySpec) -> Vec<Stage> {
    let mut stages = base_stages(spec);
    stages.push(Stage::Count {
        field: COUNT_FIELD.to_string(),
    });
    stages
}

/// Pipeline producing the requested page.
pub fn page_pipeline(spec: &QuerySpec) -> Vec<Stage> {
    let mut stages = base_stages(spec);
    if !spec.bypass_pagination {
        let skip = spec.page.saturating_sub(1).saturating_mul(spec.limit);
        stages.push(Stage::Skip(skip));
        stages.push(Stage::Limit(spec.limit));
    }
    stages
}

/// Retrieval engine for one entity.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
    schema: Arc<QuerySchema>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>, schema: QuerySchema) -> Self {
        Self {
            store,
            schema: Arc::new(schema),
        }
    }

    pub fn schema(&self) -> &QuerySchema {
        &self.schema
    }

    /// Run a list request expressed as request parameters.
    pub async fn list(&self, params: &ListParams) -> StoreResult<QueryResult> {
        let spec = QuerySpec::from_params(&self.schema, params);
        self.run(&spec).await
    }

    /// Count, then fetch the page.
    ///
    /// The two round-trips are independent reads; a concurrent write between
    /// them can make `total` disagree with the page.
    pub async fn run(&self, spec: &QuerySpec) -> StoreResult<QueryResult> {
        let collection = &self.schema.collection;

        let count_stages = count_pipeline(spec);
        tracing::debug!(
            collection = %collection,
            pipeline = %pipeline_to_json(&count_stages),
            "counting"
        );
        let counted = self.store.aggregate(collection, &count_stages).await?;
        let total = counted
            .first()
            .and_then(|row| row.get(COUNT_FIELD))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let page_stages = page_pipeline(spec);
        let data = self.store.aggregate(collection, &page_stages).await?;

        tracing::debug!(
            collection = %collection,
            total,
            returned = data.len(),
            page = spec.page,
            "query executed"
        );

        Ok(QueryResult {
            total,
            page: spec.page,
            limit: spec.limit,
            data,
        })
    }
}
