//! Built-in entity definitions.

use std::sync::Arc;

use super::{EntityDefinition, StatusBreakdown};
use crate::category::CATEGORY_COLLECTION;
use crate::query::{FilterField, QuerySchema, RelationRef};

/// Every entity served under `/api/{entity}`.
pub fn default_entities() -> Vec<EntityDefinition> {
    vec![
        EntityDefinition::new(
            QuerySchema::new("purchaseOrders")
                .relations(vec![
                    RelationRef::new("supplierId"),
                    RelationRef::new("warehouseId"),
                ])
                .search_fields(&["orderNumber", "supplierId.name", "lines.sku"])
                .filters(vec![
                    FilterField::any_of("supplierIds", "supplierId"),
                    FilterField::any_of("warehouseIds", "warehouseId"),
                ]),
        )
        .with_statistics(Arc::new(
            StatusBreakdown::new("status").with_amount("totalAmount"),
        )),
        EntityDefinition::new(
            QuerySchema::new("goodsReceivedNotes")
                .relations(vec![
                    RelationRef::new("purchaseOrderId")
                        .with_nested(vec![RelationRef::new("supplierId")]),
                    RelationRef::new("warehouseId"),
                ])
                .search_fields(&["grnNumber", "referenceNumber", "items.sku"])
                .filters(vec![FilterField::any_of(
                    "purchaseOrderIds",
                    "purchaseOrderId",
                )]),
        )
        .with_statistics(Arc::new(StatusBreakdown::new("status"))),
        EntityDefinition::new(
            QuerySchema::new("goodsReturnNotes")
                .relations(vec![
                    RelationRef::new("goodsReceivedNoteId"),
                    RelationRef::new("supplierId"),
                ])
                .search_fields(&["returnNumber", "reason", "items.sku"])
                .filters(vec![FilterField::any_of("supplierIds", "supplierId")]),
        ),
        EntityDefinition::new(
            QuerySchema::new("suppliers")
                .relations(vec![RelationRef::new("categoryIds").many()])
                .search_fields(&["name", "code", "contacts.email"]),
        ),
        EntityDefinition::new(
            QuerySchema::new("products")
                .relations(vec![RelationRef::new("categoryId"), RelationRef::new("unitId")])
                .search_fields(&["name", "sku", "attributes.pricing.marketplaceName"])
                .filters(vec![FilterField::any_of("categoryIds", "categoryId")]),
        ),
        EntityDefinition::new(
            QuerySchema::new(CATEGORY_COLLECTION)
                .relations(vec![RelationRef::to("parentId", CATEGORY_COLLECTION)])
                .search_fields(&["name"]),
        ),
        EntityDefinition::new(QuerySchema::new("warehouses").search_fields(&["name", "code"])),
        EntityDefinition::new(QuerySchema::new("units").search_fields(&["name", "symbol"])),
    ]
}
