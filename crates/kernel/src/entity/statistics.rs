//! Optional per-entity statistics attached to list responses.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::record::get_path;
use crate::store::{Condition, DocumentStore, Stage, StoreResult};

/// Computes a summary over the records matched by a list request.
///
/// Only entities that register a provider answer `includeStats=true`; the
/// flag is ignored everywhere else.
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    async fn collect(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        filters: &[Condition],
    ) -> StoreResult<Value>;
}

/// Counts matched records per status value, optionally summing an amount.
#[derive(Debug, Clone)]
pub struct StatusBreakdown {
    status_field: String,
    amount_field: Option<String>,
}

impl StatusBreakdown {
    pub fn new(status_field: &str) -> Self {
        Self {
            status_field: status_field.to_string(),
            amount_field: None,
        }
    }

    pub fn with_amount(mut self, amount_field: &str) -> Self {
        self.amount_field = Some(amount_field.to_string());
        self
    }

    fn summarize(&self, records: &[Value]) -> Value {
        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut amount = 0.0;

        for record in records {
            let status = get_path(record, &self.status_field)
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            *by_status.entry(status.to_string()).or_default() += 1;

            if let Some(field) = &self.amount_field {
                amount += get_path(record, field).and_then(Value::as_f64).unwrap_or(0.0);
            }
        }

        let mut summary = Map::new();
        summary.insert("total".into(), json!(records.len()));
        summary.insert("byStatus".into(), json!(by_status));
        if self.amount_field.is_some() {
            summary.insert("totalAmount".into(), json!(amount));
        }
        Value::Object(summary)
    }
}

#[async_trait]
impl StatisticsProvider for StatusBreakdown {
    async fn collect(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        filters: &[Condition],
    ) -> StoreResult<Value> {
        let records = store
            .aggregate(collection, &[Stage::Match(Condition::And(filters.to_vec()))])
            .await?;
        Ok(self.summarize(&records))
    }
}
