//! Relation expansion ("populate").
//!
//! Each relation becomes a left-join lookup followed by a flatten, so the
//! referenced record replaces its identifier in place. Records whose
//! reference is null or dangling are kept with the field removed.

use crate::record::ID_FIELD;
use crate::store::Stage;

/// A reference from a local field to another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    pub local_field: String,
    pub target_collection: String,
    /// The local field holds a list of identifiers; keep the joined array.
    pub many: bool,
    /// Relations expanded inside the joined records.
    pub nested: Vec<RelationRef>,
}

impl RelationRef {
    /// Relation whose target collection follows the naming convention.
    pub fn new(local_field: &str) -> Self {
        Self {
            local_field: local_field.to_string(),
            target_collection: collection_for_field(local_field),
            many: false,
            nested: Vec::new(),
        }
    }

    /// Relation with an explicit target collection.
    pub fn to(local_field: &str, target_collection: &str) -> Self {
        Self {
            local_field: local_field.to_string(),
            target_collection: target_collection.to_string(),
            many: false,
            nested: Vec::new(),
        }
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn with_nested(mut self, nested: Vec<RelationRef>) -> Self {
        self.nested = nested;
        self
    }
}

/// Derive a collection name from a reference field.
///
/// `supplierId` → `suppliers`, `categoryId` → `categories`,
/// `productIds` → `products`.
pub fn collection_for_field(local_field: &str) -> String {
    let leaf = local_field.rsplit('.').next().unwrap_or(local_field);
    let base = leaf
        .strip_suffix("Ids")
        .or_else(|| leaf.strip_suffix("Id"))
        .filter(|stem| !stem.is_empty())
        .unwrap_or(leaf);
    pluralize(base)
}

fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// Build the lookup/flatten stages for an ordered list of relations.
pub fn expand_relations(relations: &[RelationRef]) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(relations.len() * 2);
    for relation in relations {
        stages.push(Stage::Lookup {
            from: relation.target_collection.clone(),
            local_field: relation.local_field.clone(),
            foreign_field: ID_FIELD.to_string(),
            as_field: relation.local_field.clone(),
            pipeline: expand_relations(&relation.nested),
        });
        if !relation.many {
            stages.push(Stage::Unwind {
                path: relation.local_field.clone(),
                preserve_null_and_empty: true,
            });
        }
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_convention() {
        assert_eq!(collection_for_field("supplierId"), "suppliers");
        assert_eq!(collection_for_field("categoryId"), "categories");
        assert_eq!(collection_for_field("productIds"), "products");
        assert_eq!(collection_for_field("warehouseId"), "warehouses");
        assert_eq!(collection_for_field("taxId"), "taxes");
        assert_eq!(collection_for_field("purchaseOrderId"), "purchaseOrders");
        assert_eq!(collection_for_field("lines.productId"), "products");
        assert_eq!(collection_for_field("currency"), "currencies");
    }

    #[test]
    fn explicit_collection_overrides_convention() {
        let relation = RelationRef::to("createdBy", "users");
        assert_eq!(relation.target_collection, "users");
    }

    #[test]
    fn each_relation_is_a_join_then_flatten() {
        let stages = expand_relations(&[RelationRef::new("supplierId"), RelationRef::new("warehouseId")]);

        assert_eq!(stages.len(), 4);
        assert!(matches!(&stages[0], Stage::Lookup { from, .. } if from == "suppliers"));
        assert!(matches!(
            &stages[1],
            Stage::Unwind { path, preserve_null_and_empty: true } if path == "supplierId"
        ));
        assert!(matches!(&stages[2], Stage::Lookup { from, .. } if from == "warehouses"));
    }

    #[test]
    fn many_relations_keep_the_array() {
        let stages = expand_relations(&[RelationRef::new("productIds").many()]);
        assert_eq!(stages.len(), 1);
    }

    #[test]
    fn nested_relations_expand_inside_the_lookup() {
        let relation = RelationRef::new("productId")
            .with_nested(vec![RelationRef::new("categoryId"), RelationRef::new("brandId")]);
        let stages = expand_relations(&[relation]);

        let Stage::Lookup { pipeline, .. } = &stages[0] else {
            panic!("expected lookup");
        };
        assert_eq!(pipeline.len(), 4);
        assert!(matches!(&pipeline[0], Stage::Lookup { from, .. } if from == "categories"));
        assert!(matches!(&pipeline[2], Stage::Lookup { from, .. } if from == "brands"));
    }
}
