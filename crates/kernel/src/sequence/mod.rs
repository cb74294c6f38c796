//! Document-number generation.
//!
//! Business documents carry human-readable numbers of the form
//! `PREFIX-YYYY-NNN`. The counter is scoped to the calendar year and padded
//! to at least three digits.
//!
//! Two generators implement [`SequenceGenerator`]:
//! - [`ScanningSequenceGenerator`] reads the latest number already stored and
//!   adds one. Two concurrent callers can read the same latest record and
//!   receive the same number; nothing is reserved until a record carrying the
//!   number is persisted.
//! - [`CounterSequenceGenerator`] increments an atomic per-type, per-year
//!   counter in the store, so every call gets a distinct number.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::record::{CREATED_AT_FIELD, ID_FIELD, get_path};
use crate::store::{Condition, DocumentStore, SortDirection, SortKey, Stage, StoreError};

/// Configuration of one document-number type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceConfig {
    pub type_key: String,
    pub collection: String,
    pub number_field: String,
    pub prefix: String,
}

impl SequenceConfig {
    pub fn new(type_key: &str, collection: &str, number_field: &str, prefix: &str) -> Self {
        Self {
            type_key: type_key.to_string(),
            collection: collection.to_string(),
            number_field: number_field.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// The part of every number issued in `year` before the counter.
    pub fn year_prefix(&self, year: i32) -> String {
        format!("{}-{year}-", self.prefix)
    }

    /// Format a counter value.
    pub fn format(&self, year: i32, counter: u64) -> String {
        format!("{}{counter:03}", self.year_prefix(year))
    }
}

/// Document-number types known to the backend.
pub fn default_sequences() -> Vec<SequenceConfig> {
    vec![
        SequenceConfig::new("PURCHASE_ORDER", "purchaseOrders", "orderNumber", "PO"),
        SequenceConfig::new("GRN", "goodsReceivedNotes", "grnNumber", "GRN"),
        SequenceConfig::new(
            "GRN_REFERENCE",
            "goodsReceivedNotes",
            "referenceNumber",
            "GRREF",
        ),
        SequenceConfig::new("GOODS_RETURN", "goodsReturnNotes", "returnNumber", "GRT"),
    ]
}

/// Lookup of sequence configurations by type key.
#[derive(Debug, Clone, Default)]
pub struct SequenceRegistry {
    configs: HashMap<String, SequenceConfig>,
}

impl SequenceRegistry {
    pub fn new(configs: Vec<SequenceConfig>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|c| (c.type_key.clone(), c))
                .collect(),
        }
    }

    pub fn get(&self, type_key: &str) -> Option<&SequenceConfig> {
        self.configs.get(type_key)
    }

    /// Registered type keys, sorted.
    pub fn type_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Errors raised while generating a number.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("unknown sequence type: {0}")]
    UnknownType(String),

    #[error("sequence {type_key} cannot advance past {number}")]
    Exhausted { type_key: String, number: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues the next number for a document type.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Document types this generator numbers.
    fn registry(&self) -> &SequenceRegistry;

    /// Next number for `type_key` in the given calendar year.
    async fn next_number_in_year(&self, type_key: &str, year: i32)
    -> Result<String, SequenceError>;

    /// Next number for `type_key` in the current (UTC) year.
    async fn next_number(&self, type_key: &str) -> Result<String, SequenceError> {
        self.next_number_in_year(type_key, Utc::now().year()).await
    }
}

/// Run of digits at the end of a stored number.
fn trailing_digits(number: &str) -> Option<&str> {
    let digits_start = number
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(&number[digits_start..])
}

/// Counter following the latest stored number.
///
/// Numbers without a trailing counter restart the year at one. A counter
/// that does not fit in a `u64` or cannot be incremented is an error, never
/// a restart.
fn next_counter(type_key: &str, previous: Option<&str>) -> Result<u64, SequenceError> {
    let Some(number) = previous else {
        return Ok(1);
    };
    let Some(digits) = trailing_digits(number) else {
        return Ok(1);
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| SequenceError::Exhausted {
            type_key: type_key.to_string(),
            number: number.to_string(),
        })
}

/// Derives the next number from the most recently created record.
pub struct ScanningSequenceGenerator {
    store: Arc<dyn DocumentStore>,
    registry: SequenceRegistry,
}

impl ScanningSequenceGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, registry: SequenceRegistry) -> Self {
        Self { store, registry }
    }

    /// Pipeline selecting the latest record numbered in `year`.
    ///
    /// Soft-deleted records are included so their numbers are not reissued.
    pub fn latest_pipeline(config: &SequenceConfig, year: i32) -> Vec<Stage> {
        vec![
            Stage::Match(Condition::starts_with(
                config.number_field.as_str(),
                &config.year_prefix(year),
            )),
            Stage::Sort(vec![
                SortKey::new(CREATED_AT_FIELD, SortDirection::Desc),
                SortKey::new(ID_FIELD, SortDirection::Desc),
            ]),
            Stage::Limit(1),
        ]
    }
}

#[async_trait]
impl SequenceGenerator for ScanningSequenceGenerator {
    fn registry(&self) -> &SequenceRegistry {
        &self.registry
    }

    async fn next_number_in_year(
        &self,
        type_key: &str,
        year: i32,
    ) -> Result<String, SequenceError> {
        let config = self
            .registry
            .get(type_key)
            .ok_or_else(|| SequenceError::UnknownType(type_key.to_string()))?;

        let latest = self
            .store
            .aggregate(&config.collection, &Self::latest_pipeline(config, year))
            .await?;

        let previous = latest
            .first()
            .and_then(|doc| get_path(doc, &config.number_field))
            .and_then(Value::as_str);

        let next = next_counter(type_key, previous)?;
        let number = config.format(year, next);
        tracing::debug!(type_key, %number, "generated sequence number");
        Ok(number)
    }
}

/// Issues numbers from an atomic counter kept in the store.
pub struct CounterSequenceGenerator {
    store: Arc<dyn DocumentStore>,
    registry: SequenceRegistry,
}

impl CounterSequenceGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, registry: SequenceRegistry) -> Self {
        Self { store, registry }
    }

    fn counter_key(config: &SequenceConfig, year: i32) -> String {
        format!("sequence:{}:{year}", config.type_key)
    }
}

#[async_trait]
impl SequenceGenerator for CounterSequenceGenerator {
    fn registry(&self) -> &SequenceRegistry {
        &self.registry
    }

    async fn next_number_in_year(
        &self,
        type_key: &str,
        year: i32,
    ) -> Result<String, SequenceError> {
        let config = self
            .registry
            .get(type_key)
            .ok_or_else(|| SequenceError::UnknownType(type_key.to_string()))?;

        let value = self
            .store
            .increment_counter(&Self::counter_key(config, year))
            .await?;
        let next = u64::try_from(value).unwrap_or(1).max(1);
        Ok(config.format(year, next))
    }
}
