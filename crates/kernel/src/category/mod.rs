//! Hierarchical categories.
//!
//! Categories are ordinary records in the `categories` collection with a
//! `parentId` reference. [`CategoryService::tree`] fetches every
//! non-deleted category and materializes the forest.

mod tree;

pub use tree::{CategoryNode, FlatCategory, MAX_TREE_DEPTH, TreeError, build_tree};

use std::sync::Arc;

use thiserror::Error;

use crate::record::{CREATED_AT_FIELD, ID_FIELD, IS_DELETED_FIELD};
use crate::store::{
    Condition, DocumentStore, MatchValue, SortDirection, SortKey, Stage, StoreError,
};

/// Collection holding category records.
pub const CATEGORY_COLLECTION: &str = "categories";

/// Errors raised while listing the category tree.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Reads categories and assembles them into a tree.
pub struct CategoryService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl CategoryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: CATEGORY_COLLECTION.to_string(),
        }
    }

    /// Full forest of non-deleted categories, oldest first among siblings.
    pub async fn tree(&self) -> Result<Vec<CategoryNode>, CategoryError> {
        let stages = [
            Stage::Match(Condition::eq(IS_DELETED_FIELD, MatchValue::Bool(false))),
            Stage::Sort(vec![
                SortKey::new(CREATED_AT_FIELD, SortDirection::Asc),
                SortKey::new(ID_FIELD, SortDirection::Asc),
            ]),
        ];
        let docs = self.store.aggregate(&self.collection, &stages).await?;

        let flat: Vec<FlatCategory> = docs.iter().filter_map(FlatCategory::from_document).collect();
        if flat.len() != docs.len() {
            tracing::warn!(
                skipped = docs.len() - flat.len(),
                "category records without a usable id"
            );
        }

        Ok(build_tree(flat)?)
    }
}
