//! Filter normalization.
//!
//! Turns raw request values into store-native match conditions. How a
//! parameter is interpreted is decided by its declared [`FilterKind`], never
//! by the spelling of its name.

use serde_json::{Number, Value};

use crate::record::{IS_ACTIVE_FIELD, IS_DEFAULT_FIELD, IS_DELETED_FIELD, parse_id};
use crate::store::{Condition, MatchValue};

/// How a filter parameter is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Equality; identifier-shaped strings are coerced to identifiers.
    Scalar,
    /// Equality against a boolean field; `"true"`/`"false"` are parsed.
    Boolean,
    /// Membership: matches any of the supplied identifiers.
    AnyOf,
}

/// A filter parameter declared by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterField {
    /// Request parameter name.
    pub param: String,
    /// Document field the condition applies to.
    pub field: String,
    pub kind: FilterKind,
}

impl FilterField {
    pub fn scalar(field: &str) -> Self {
        Self {
            param: field.to_string(),
            field: field.to_string(),
            kind: FilterKind::Scalar,
        }
    }

    pub fn boolean(field: &str) -> Self {
        Self {
            param: field.to_string(),
            field: field.to_string(),
            kind: FilterKind::Boolean,
        }
    }

    /// Membership filter reading `param` and matching `field`.
    pub fn any_of(param: &str, field: &str) -> Self {
        Self {
            param: param.to_string(),
            field: field.to_string(),
            kind: FilterKind::AnyOf,
        }
    }
}

/// A raw filter value as received from a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    List(Vec<String>),
    Bool(bool),
    Number(Number),
}

impl RawValue {
    /// Convert a JSON value (as sent in a request body) into a raw value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RawValue::Text(s.clone())),
            Value::Bool(b) => Some(RawValue::Bool(*b)),
            Value::Number(n) => Some(RawValue::Number(n.clone())),
            Value::Array(items) => Some(RawValue::List(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )),
            Value::Null | Value::Object(_) => None,
        }
    }

    fn items(&self) -> Vec<String> {
        match self {
            RawValue::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            RawValue::List(items) => items.clone(),
            RawValue::Bool(b) => vec![b.to_string()],
            RawValue::Number(n) => vec![n.to_string()],
        }
    }
}

/// Lifecycle flags are always boolean filters.
fn builtin_flags() -> [FilterField; 3] {
    [
        FilterField::boolean(IS_ACTIVE_FIELD),
        FilterField::boolean(IS_DELETED_FIELD),
        FilterField::boolean(IS_DEFAULT_FIELD),
    ]
}

/// Normalize raw filters into match conditions.
///
/// Undeclared parameters are treated as [`FilterKind::Scalar`] on the field of
/// the same name. Unless the caller supplies `isDeleted` itself, the output
/// includes `isDeleted = false`.
pub fn normalize_filters(declared: &[FilterField], raw: &[(String, RawValue)]) -> Vec<Condition> {
    let flags = builtin_flags();
    let mut conditions = Vec::with_capacity(raw.len() + 1);
    let mut deleted_overridden = false;

    for (param, value) in raw {
        let fallback;
        let filter = match declared
            .iter()
            .chain(flags.iter())
            .find(|f| &f.param == param)
        {
            Some(filter) => filter,
            None => {
                fallback = FilterField::scalar(param);
                &fallback
            }
        };

        let condition = match filter.kind {
            FilterKind::AnyOf => any_of_condition(&filter.field, value),
            FilterKind::Boolean => Some(boolean_condition(&filter.field, value)),
            FilterKind::Scalar => scalar_condition(&filter.field, value),
        };

        if let Some(condition) = condition {
            if filter.field == IS_DELETED_FIELD {
                deleted_overridden = true;
            }
            conditions.push(condition);
        }
    }

    if !deleted_overridden {
        conditions.push(Condition::eq(IS_DELETED_FIELD, MatchValue::Bool(false)));
    }

    conditions
}

/// Invalid identifiers are dropped; an empty result omits the clause.
fn any_of_condition(field: &str, value: &RawValue) -> Option<Condition> {
    let ids: Vec<MatchValue> = value
        .items()
        .iter()
        .filter_map(|item| parse_id(item))
        .map(MatchValue::Id)
        .collect();

    if ids.is_empty() {
        tracing::debug!(field, "membership filter has no valid identifiers; omitting");
        return None;
    }

    Some(Condition::In {
        field: field.to_string(),
        values: ids,
    })
}

fn boolean_condition(field: &str, value: &RawValue) -> Condition {
    let value = match value {
        RawValue::Bool(b) => MatchValue::Bool(*b),
        RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => MatchValue::Bool(true),
            "false" => MatchValue::Bool(false),
            _ => MatchValue::String(s.clone()),
        },
        other => coerce_scalar(other),
    };
    Condition::eq(field, value)
}

fn scalar_condition(field: &str, value: &RawValue) -> Option<Condition> {
    match value {
        RawValue::List(items) => {
            if items.is_empty() {
                return None;
            }
            Some(Condition::In {
                field: field.to_string(),
                values: items
                    .iter()
                    .map(|item| coerce_scalar(&RawValue::Text(item.clone())))
                    .collect(),
            })
        }
        other => Some(Condition::eq(field, coerce_scalar(other))),
    }
}

fn coerce_scalar(value: &RawValue) -> MatchValue {
    match value {
        RawValue::Text(s) => match parse_id(s) {
            Some(id) => MatchValue::Id(id),
            None => MatchValue::String(s.clone()),
        },
        RawValue::Bool(b) => MatchValue::Bool(*b),
        RawValue::Number(n) => MatchValue::Number(n.clone()),
        RawValue::List(items) => MatchValue::String(items.join(",")),
    }
}
