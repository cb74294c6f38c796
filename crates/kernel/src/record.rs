//! Record document model.
//!
//! Every collection stores JSON objects that carry the same bookkeeping
//! fields: an `_id`, creation/update timestamps, and the lifecycle flags
//! `isActive`, `isDeleted` and `isDefault`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier field name.
pub const ID_FIELD: &str = "_id";

/// Creation timestamp field name.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Last-update timestamp field name.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Lifecycle flag: record is enabled.
pub const IS_ACTIVE_FIELD: &str = "isActive";

/// Lifecycle flag: record is soft-deleted.
pub const IS_DELETED_FIELD: &str = "isDeleted";

/// Lifecycle flag: record is the default selection.
pub const IS_DEFAULT_FIELD: &str = "isDefault";

/// A stored document.
pub type Document = Map<String, Value>;

/// Last issued creation timestamp, in microseconds since the epoch.
static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Parse a string as a store identifier.
///
/// Returns `None` for anything that is not a UUID.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

/// Generate a new store identifier (UUIDv7, sortable by creation order).
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// Issue a creation timestamp.
///
/// Timestamps are strictly increasing within a process, so sorting by
/// `createdAt` matches insertion order even when two records land in the
/// same clock tick.
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_STAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_STAMP_MICROS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(candidate).unwrap_or_else(Utc::now),
            Err(observed) => last = observed,
        }
    }
}

/// Format a timestamp the way documents store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Prepare a caller payload for insertion.
///
/// Assigns `_id` and timestamps and fills in any missing lifecycle flags.
/// A caller-supplied `_id` is kept only when it is a valid identifier.
pub fn stamp_new(mut payload: Document) -> Document {
    let id = payload
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(parse_id)
        .unwrap_or_else(new_id);
    payload.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

    let now = format_timestamp(next_timestamp());
    payload.insert(CREATED_AT_FIELD.to_string(), Value::String(now.clone()));
    payload.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));

    for (flag, default) in [
        (IS_ACTIVE_FIELD, true),
        (IS_DELETED_FIELD, false),
        (IS_DEFAULT_FIELD, false),
    ] {
        if !matches!(payload.get(flag), Some(Value::Bool(_))) {
            payload.insert(flag.to_string(), Value::Bool(default));
        }
    }

    payload
}

/// Merge an update payload into an existing document.
///
/// `_id` and `createdAt` are immutable; `updatedAt` is refreshed.
pub fn apply_update(existing: &mut Document, patch: Document) {
    for (key, value) in patch {
        if key == ID_FIELD || key == CREATED_AT_FIELD {
            continue;
        }
        existing.insert(key, value);
    }
    existing.insert(
        UPDATED_AT_FIELD.to_string(),
        Value::String(format_timestamp(next_timestamp())),
    );
}

/// Read the identifier of a document.
pub fn document_id(doc: &Document) -> Option<Uuid> {
    doc.get(ID_FIELD).and_then(Value::as_str).and_then(parse_id)
}

/// Resolve a dotted path against a JSON value without descending into arrays.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamp_new_fills_bookkeeping_fields() {
        let doc = stamp_new(json!({"name": "Acme"}).as_object().unwrap().clone());

        assert!(document_id(&doc).is_some());
        assert_eq!(doc[IS_ACTIVE_FIELD], json!(true));
        assert_eq!(doc[IS_DELETED_FIELD], json!(false));
        assert_eq!(doc[IS_DEFAULT_FIELD], json!(false));
        assert_eq!(doc[CREATED_AT_FIELD], doc[UPDATED_AT_FIELD]);
    }

    #[test]
    fn stamp_new_keeps_explicit_flags_and_valid_id() {
        let id = Uuid::now_v7();
        let payload = json!({"_id": id.to_string(), "isDefault": true});
        let doc = stamp_new(payload.as_object().unwrap().clone());

        assert_eq!(document_id(&doc), Some(id));
        assert_eq!(doc[IS_DEFAULT_FIELD], json!(true));
    }

    #[test]
    fn stamp_new_replaces_invalid_id() {
        let payload = json!({"_id": "not-an-id"});
        let doc = stamp_new(payload.as_object().unwrap().clone());
        assert_ne!(doc[ID_FIELD], json!("not-an-id"));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let stamps: Vec<String> = (0..50)
            .map(|_| format_timestamp(next_timestamp()))
            .collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn apply_update_protects_identity() {
        let mut doc = stamp_new(json!({"name": "a"}).as_object().unwrap().clone());
        let id = doc[ID_FIELD].clone();
        let created = doc[CREATED_AT_FIELD].clone();

        let patch = json!({"_id": "x", "createdAt": "y", "name": "b"});
        apply_update(&mut doc, patch.as_object().unwrap().clone());

        assert_eq!(doc[ID_FIELD], id);
        assert_eq!(doc[CREATED_AT_FIELD], created);
        assert_eq!(doc["name"], json!("b"));
    }

    #[test]
    fn get_path_walks_objects() {
        let value = json!({"a": {"b": {"c": 3}}, "list": [1, 2]});
        assert_eq!(get_path(&value, "a.b.c"), Some(&json!(3)));
        assert_eq!(get_path(&value, "a.x"), None);
        assert_eq!(get_path(&value, "list.0"), None);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert!(parse_id("hello").is_none());
        assert!(parse_id(&Uuid::nil().to_string()).is_some());
    }
}
