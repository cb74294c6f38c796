//! Procura test utilities.
//!
//! Helpers for integration testing: record fixtures for the built-in
//! entities and assertion utilities for JSON responses.

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Create a purchase order fixture.
pub fn purchase_order(order_number: &str) -> TestRecord {
    TestRecord::new()
        .with_field("orderNumber", order_number.into())
        .with_field("status", "draft".into())
        .with_field("lines", JsonValue::Array(Vec::new()))
}

/// Create a supplier fixture.
pub fn supplier(name: &str) -> TestRecord {
    TestRecord::new().with_field("name", name.into())
}

/// Create a product fixture.
pub fn product(name: &str, sku: &str) -> TestRecord {
    TestRecord::new()
        .with_field("name", name.into())
        .with_field("sku", sku.into())
}

/// Create a category fixture.
pub fn category(name: &str) -> TestRecord {
    TestRecord::new().with_field("name", name.into())
}

/// A record builder for creating test fixtures.
///
/// The id is chosen up front so fixtures can reference each other before
/// they are stored.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub id: Uuid,
    pub fields: Map<String, JsonValue>,
}

impl Default for TestRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRecord {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            fields: Map::new(),
        }
    }

    /// Set a custom ID.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Add a single field.
    pub fn with_field(mut self, name: &str, value: JsonValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Point `field` at another record.
    pub fn referencing(self, field: &str, target: &TestRecord) -> Self {
        let id = target.id_string();
        self.with_field(field, id.into())
    }

    /// Set the category parent.
    pub fn with_parent(self, parent: &TestRecord) -> Self {
        self.referencing("parentId", parent)
    }

    /// Append an element to an array field, creating it if needed.
    pub fn push_to(mut self, field: &str, element: JsonValue) -> Self {
        match self.fields.get_mut(field) {
            Some(JsonValue::Array(items)) => items.push(element),
            _ => {
                self.fields
                    .insert(field.to_string(), JsonValue::Array(vec![element]));
            }
        }
        self
    }

    /// Add an order line.
    pub fn with_line(self, sku: &str, quantity: u32) -> Self {
        self.push_to("lines", serde_json::json!({ "sku": sku, "quantity": quantity }))
    }

    /// Mark as soft-deleted.
    pub fn deleted(self) -> Self {
        self.with_field("isDeleted", true.into())
    }

    /// Mark as inactive.
    pub fn inactive(self) -> Self {
        self.with_field("isActive", false.into())
    }

    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// JSON payload including `_id`, suitable for a create request.
    pub fn to_payload(&self) -> JsonValue {
        let mut payload = self.fields.clone();
        payload.insert("_id".to_string(), self.id_string().into());
        JsonValue::Object(payload)
    }
}

/// Assertion helpers for JSON responses.
#[allow(clippy::unwrap_used)]
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a response body reports success.
    pub fn success(body: &Value) {
        assert_eq!(
            body.get("success"),
            Some(&Value::Bool(true)),
            "Expected success response, got: {}",
            serde_json::to_string_pretty(body).unwrap()
        );
    }

    /// Assert that a response body reports failure with a message.
    pub fn failure(body: &Value) {
        assert_eq!(
            body.get("success"),
            Some(&Value::Bool(false)),
            "Expected failure response, got: {body}"
        );
        assert!(
            body.get("message").and_then(Value::as_str).is_some(),
            "Expected failure message, got: {body}"
        );
    }

    /// Ids of the records in a list response, in order.
    pub fn ids(body: &Value) -> Vec<String> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["_id"].as_str().unwrap().to_string())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_id_and_fields() {
        let po = purchase_order("PO-2026-001").with_line("BOLT-M8", 4);
        let payload = po.to_payload();

        assert_eq!(payload["_id"], JsonValue::from(po.id_string()));
        assert_eq!(payload["orderNumber"], "PO-2026-001");
        assert_eq!(payload["lines"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn references_use_target_id() {
        let parent = category("Hardware");
        let child = category("Bolts").with_parent(&parent);
        assert_eq!(
            child.fields["parentId"],
            JsonValue::from(parent.id_string())
        );
    }
}
