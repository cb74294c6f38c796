//! Generic retrieval engine shared by every entity.
//!
//! This module provides:
//! - Filter normalization (typed filter kinds, identifier coercion)
//! - Relation expansion (left-join "populate", nested)
//! - Nested search with fan-out de-duplication
//! - Counting and pagination
//! - List parameter parsing

mod engine;
pub mod filter;
pub mod params;
pub mod relation;
pub mod search;

pub use engine::{
    QueryEngine, QueryResult, QuerySchema, QuerySpec, base_stages, count_pipeline, page_pipeline,
};
pub use filter::{FilterField, FilterKind, RawValue, normalize_filters};
pub use params::{BYPASS_SENTINEL, DEFAULT_LIMIT, ListParams};
pub use relation::{RelationRef, collection_for_field, expand_relations};
pub use search::search_stages;
