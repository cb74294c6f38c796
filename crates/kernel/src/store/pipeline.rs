//! Aggregation pipeline types and the in-process evaluator.
//!
//! A pipeline is an ordered list of [`Stage`]s applied to the documents of
//! one collection. The stage vocabulary mirrors what a document store's
//! aggregate API offers: match, lookup (left join), unwind, group-first,
//! replace-root, sort, skip, limit and count.
//!
//! Backends that cannot run a stage natively hand the documents to
//! [`evaluate`], which implements every stage in memory.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Number, Value, json};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::record::{get_path, parse_id};

/// A value a match condition compares against.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    /// Store identifier. Matches string fields that parse to the same id.
    Id(Uuid),
    String(String),
    Bool(bool),
    Number(Number),
    Null,
}

impl MatchValue {
    /// JSON representation as stored in documents.
    pub fn to_json(&self) -> Value {
        match self {
            MatchValue::Id(id) => Value::String(id.to_string()),
            MatchValue::String(s) => Value::String(s.clone()),
            MatchValue::Bool(b) => Value::Bool(*b),
            MatchValue::Number(n) => Value::Number(n.clone()),
            MatchValue::Null => Value::Null,
        }
    }

    fn matches(&self, candidate: &Value) -> bool {
        match (self, candidate) {
            (MatchValue::Id(id), Value::String(s)) => parse_id(s) == Some(*id),
            (MatchValue::String(expected), Value::String(s)) => expected == s,
            (MatchValue::Bool(expected), Value::Bool(b)) => expected == b,
            (MatchValue::Number(expected), Value::Number(n)) => {
                expected.as_f64().zip(n.as_f64()).is_some_and(|(a, b)| a == b)
            }
            (MatchValue::Null, Value::Null) => true,
            _ => false,
        }
    }
}

/// A match condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value. Array fields match when any element equals it.
    Eq { field: String, value: MatchValue },
    /// Field equals any of the values.
    In {
        field: String,
        values: Vec<MatchValue>,
    },
    /// Field matches a regular expression.
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    /// Every condition holds.
    And(Vec<Condition>),
    /// At least one condition holds.
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: MatchValue) -> Self {
        Condition::Eq {
            field: field.into(),
            value,
        }
    }

    /// Case-insensitive substring match of a literal term.
    pub fn contains_ci(field: impl Into<String>, term: &str) -> Self {
        Condition::Regex {
            field: field.into(),
            pattern: regex::escape(term),
            case_insensitive: true,
        }
    }

    /// Case-sensitive match anchored at the start of the field.
    pub fn starts_with(field: impl Into<String>, prefix: &str) -> Self {
        Condition::Regex {
            field: field.into(),
            pattern: format!("^{}", regex::escape(prefix)),
            case_insensitive: false,
        }
    }

    /// Field name for single-field conditions.
    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::Eq { field, .. }
            | Condition::In { field, .. }
            | Condition::Regex { field, .. } => Some(field),
            Condition::And(_) | Condition::Or(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Condition::Eq { field, value } => json!({ field: value.to_json() }),
            Condition::In { field, values } => {
                let values: Vec<Value> = values.iter().map(MatchValue::to_json).collect();
                json!({ field: { "$in": values } })
            }
            Condition::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let options = if *case_insensitive { "i" } else { "" };
                json!({ field: { "$regex": pattern, "$options": options } })
            }
            Condition::And(conditions) => {
                json!({ "$and": conditions.iter().map(Condition::to_json).collect::<Vec<_>>() })
            }
            Condition::Or(conditions) => {
                json!({ "$or": conditions.iter().map(Condition::to_json).collect::<Vec<_>>() })
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// One key of a sort stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Condition),
    /// Left join: documents of `from` whose `foreign_field` equals the local
    /// value are run through `pipeline` and stored as an array in `as_field`.
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
        pipeline: Vec<Stage>,
    },
    /// One output row per element of the array at `path`.
    Unwind {
        path: String,
        preserve_null_and_empty: bool,
    },
    /// Copy the whole document into `field`.
    StashRoot { field: String },
    /// Keep the first row per distinct value of `key`.
    GroupFirst { key: String },
    /// Replace each row with the document held in `field`.
    RestoreRoot { field: String },
    Sort(Vec<SortKey>),
    Skip(u64),
    Limit(u64),
    /// Collapse the input into a single `{ field: n }` row.
    Count { field: String },
}

impl Stage {
    /// Document-store style rendering, used for logging and inspection.
    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match(condition) => json!({ "$match": condition.to_json() }),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
                pipeline,
            } => json!({
                "$lookup": {
                    "from": from,
                    "localField": local_field,
                    "foreignField": foreign_field,
                    "as": as_field,
                    "pipeline": pipeline_to_json(pipeline),
                }
            }),
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => json!({
                "$unwind": {
                    "path": format!("${path}"),
                    "preserveNullAndEmptyArrays": preserve_null_and_empty,
                }
            }),
            Stage::StashRoot { field } => json!({ "$addFields": { field: "$$ROOT" } }),
            Stage::GroupFirst { key } => json!({
                "$group": { "_id": format!("${key}"), "doc": { "$first": "$$ROOT" } }
            }),
            Stage::RestoreRoot { field } => {
                json!({ "$replaceRoot": { "newRoot": format!("$doc.{field}") } })
            }
            Stage::Sort(keys) => {
                let mut spec = Map::new();
                for key in keys {
                    let dir = match key.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    };
                    spec.insert(key.field.clone(), json!(dir));
                }
                json!({ "$sort": spec })
            }
            Stage::Skip(n) => json!({ "$skip": n }),
            Stage::Limit(n) => json!({ "$limit": n }),
            Stage::Count { field } => json!({ "$count": field }),
        }
    }
}

/// Render a whole pipeline as JSON.
pub fn pipeline_to_json(stages: &[Stage]) -> Value {
    Value::Array(stages.iter().map(Stage::to_json).collect())
}

/// Collections referenced by lookup stages, including nested ones.
pub fn lookup_targets(stages: &[Stage]) -> HashSet<String> {
    let mut targets = HashSet::new();
    collect_lookup_targets(stages, &mut targets);
    targets
}

fn collect_lookup_targets(stages: &[Stage], targets: &mut HashSet<String>) {
    for stage in stages {
        if let Stage::Lookup { from, pipeline, .. } = stage {
            targets.insert(from.clone());
            collect_lookup_targets(pipeline, targets);
        }
    }
}

/// Snapshot of collections a pipeline may join against.
pub type Collections = HashMap<String, Vec<Value>>;

/// Run `stages` over `input`.
pub fn evaluate(
    input: Vec<Value>,
    stages: &[Stage],
    collections: &Collections,
) -> StoreResult<Vec<Value>> {
    let mut rows = input;
    for stage in stages {
        rows = apply_stage(rows, stage, collections)?;
    }
    Ok(rows)
}

fn apply_stage(
    rows: Vec<Value>,
    stage: &Stage,
    collections: &Collections,
) -> StoreResult<Vec<Value>> {
    match stage {
        Stage::Match(condition) => {
            let matcher = Matcher::compile(condition)?;
            Ok(rows.into_iter().filter(|row| matcher.test(row)).collect())
        }
        Stage::Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
            pipeline,
        } => {
            let empty = Vec::new();
            let foreign = collections.get(from).unwrap_or(&empty);
            rows.into_iter()
                .map(|mut row| -> StoreResult<Value> {
                    let local = resolve_values(&row, local_field);
                    let joined: Vec<Value> = foreign
                        .iter()
                        .filter(|candidate| {
                            let keys = resolve_values(candidate, foreign_field);
                            keys.iter()
                                .any(|key| local.iter().any(|value| values_equal(key, value)))
                        })
                        .cloned()
                        .collect();
                    let joined = evaluate(joined, pipeline, collections)?;
                    set_path(&mut row, as_field, Value::Array(joined));
                    Ok(row)
                })
                .collect()
        }
        Stage::Unwind {
            path,
            preserve_null_and_empty,
        } => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                match get_path(&row, path).cloned() {
                    Some(Value::Array(items)) if !items.is_empty() => {
                        for item in items {
                            let mut copy = row.clone();
                            set_path(&mut copy, path, item);
                            out.push(copy);
                        }
                    }
                    Some(Value::Array(_)) => {
                        if *preserve_null_and_empty {
                            let mut copy = row;
                            remove_path(&mut copy, path);
                            out.push(copy);
                        }
                    }
                    None | Some(Value::Null) => {
                        if *preserve_null_and_empty {
                            out.push(row);
                        }
                    }
                    Some(_) => out.push(row),
                }
            }
            Ok(out)
        }
        Stage::StashRoot { field } => Ok(rows
            .into_iter()
            .map(|mut row| {
                let snapshot = row.clone();
                set_path(&mut row, field, snapshot);
                row
            })
            .collect()),
        Stage::GroupFirst { key } => {
            let mut seen = HashSet::new();
            Ok(rows
                .into_iter()
                .filter(|row| {
                    let group = get_path(row, key).cloned().unwrap_or(Value::Null);
                    seen.insert(group.to_string())
                })
                .collect())
        }
        Stage::RestoreRoot { field } => Ok(rows
            .into_iter()
            .map(|row| match get_path(&row, field) {
                Some(original @ Value::Object(_)) => original.clone(),
                _ => row,
            })
            .collect()),
        Stage::Sort(keys) => {
            let mut rows = rows;
            rows.sort_by(|a, b| compare_rows(a, b, keys));
            Ok(rows)
        }
        Stage::Skip(n) => Ok(rows.into_iter().skip(clamp(*n)).collect()),
        Stage::Limit(n) => Ok(rows.into_iter().take(clamp(*n)).collect()),
        Stage::Count { field } => {
            if rows.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![json!({ field: rows.len() })])
            }
        }
    }
}

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// A condition with its regular expressions compiled.
enum Matcher {
    Eq(String, MatchValue),
    In(String, Vec<MatchValue>),
    Regex(String, Regex),
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
}

impl Matcher {
    fn compile(condition: &Condition) -> StoreResult<Self> {
        Ok(match condition {
            Condition::Eq { field, value } => Matcher::Eq(field.clone(), value.clone()),
            Condition::In { field, values } => Matcher::In(field.clone(), values.clone()),
            Condition::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| StoreError::InvalidPattern(e.to_string()))?;
                Matcher::Regex(field.clone(), regex)
            }
            Condition::And(conditions) => Matcher::And(
                conditions
                    .iter()
                    .map(Matcher::compile)
                    .collect::<StoreResult<_>>()?,
            ),
            Condition::Or(conditions) => Matcher::Or(
                conditions
                    .iter()
                    .map(Matcher::compile)
                    .collect::<StoreResult<_>>()?,
            ),
        })
    }

    fn test(&self, row: &Value) -> bool {
        match self {
            Matcher::Eq(field, value) => {
                let found = resolve_values(row, field);
                if found.is_empty() {
                    return *value == MatchValue::Null;
                }
                found.iter().any(|candidate| value.matches(candidate))
            }
            Matcher::In(field, values) => {
                let found = resolve_values(row, field);
                found
                    .iter()
                    .any(|candidate| values.iter().any(|value| value.matches(candidate)))
            }
            Matcher::Regex(field, regex) => resolve_values(row, field)
                .iter()
                .any(|candidate| candidate.as_str().is_some_and(|s| regex.is_match(s))),
            Matcher::And(matchers) => matchers.iter().all(|m| m.test(row)),
            Matcher::Or(matchers) => matchers.iter().any(|m| m.test(row)),
        }
    }
}

/// Resolve a dotted path, descending into arrays at every segment.
///
/// Arrays at the end of the path are expanded too, so a condition on an
/// array field tests each element.
fn resolve_values<'a>(row: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![row];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.as_object().and_then(|m| m.get(segment)) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    let mut flattened = Vec::with_capacity(current.len());
    for value in current {
        match value {
            Value::Array(items) => flattened.extend(items.iter()),
            other => flattened.push(other),
        }
    }
    flattened
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => match (parse_id(x), parse_id(y)) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Null, _) | (_, Value::Null) => false,
        _ => a == b,
    }
}

fn set_path(row: &mut Value, path: &str, new_value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = row;
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), new_value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_path(row: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };
    let target = match parent {
        Some(parent) => parent
            .split('.')
            .try_fold(&mut *row, |current, segment| current.get_mut(segment)),
        None => Some(row),
    };
    if let Some(Value::Object(map)) = target {
        map.remove(leaf);
    }
}

fn compare_rows(a: &Value, b: &Value, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = compare_values(get_path(a, &key.field), get_path(b, &key.field));
        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn run(input: Vec<Value>, stages: &[Stage]) -> Vec<Value> {
        evaluate(input, stages, &Collections::new()).unwrap()
    }

    #[test]
    fn match_eq_descends_into_arrays() {
        let rows = vec![
            json!({"tags": ["a", "b"]}),
            json!({"tags": ["c"]}),
            json!({"items": [{"sku": "x"}, {"sku": "y"}]}),
        ];
        let by_tag = run(
            rows.clone(),
            &[Stage::Match(Condition::eq("tags", MatchValue::String("b".into())))],
        );
        assert_eq!(by_tag.len(), 1);

        let by_sku = run(
            rows,
            &[Stage::Match(Condition::eq(
                "items.sku",
                MatchValue::String("y".into()),
            ))],
        );
        assert_eq!(by_sku.len(), 1);
    }

    #[test]
    fn match_id_compares_parsed_identifiers() {
        let id = Uuid::now_v7();
        let rows = vec![json!({"supplierId": id.to_string().to_uppercase()})];
        let out = run(
            rows,
            &[Stage::Match(Condition::eq("supplierId", MatchValue::Id(id)))],
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn contains_ci_escapes_metacharacters() {
        let rows = vec![json!({"name": "A+B Supplies"}), json!({"name": "AAB"})];
        let out = run(rows, &[Stage::Match(Condition::contains_ci("name", "a+b"))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["name"], "A+B Supplies");
    }

    #[test]
    fn unwind_preserves_missing_and_empty() {
        let rows = vec![
            json!({"_id": 1, "lines": [1, 2, 3]}),
            json!({"_id": 2, "lines": []}),
            json!({"_id": 3}),
        ];
        let stage = Stage::Unwind {
            path: "lines".into(),
            preserve_null_and_empty: true,
        };
        let out = run(rows.clone(), std::slice::from_ref(&stage));
        assert_eq!(out.len(), 5);
        assert!(out[3].get("lines").is_none());

        let strict = Stage::Unwind {
            path: "lines".into(),
            preserve_null_and_empty: false,
        };
        assert_eq!(run(rows, &[strict]).len(), 3);
    }

    #[test]
    fn lookup_is_a_left_join() {
        let supplier = Uuid::now_v7();
        let mut collections = Collections::new();
        collections.insert(
            "suppliers".into(),
            vec![json!({"_id": supplier.to_string(), "name": "Acme"})],
        );
        let rows = vec![
            json!({"_id": "a", "supplierId": supplier.to_string()}),
            json!({"_id": "b", "supplierId": null}),
        ];
        let stages = [
            Stage::Lookup {
                from: "suppliers".into(),
                local_field: "supplierId".into(),
                foreign_field: "_id".into(),
                as_field: "supplierId".into(),
                pipeline: vec![],
            },
            Stage::Unwind {
                path: "supplierId".into(),
                preserve_null_and_empty: true,
            },
        ];
        let out = evaluate(rows, &stages, &collections).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["supplierId"]["name"], "Acme");
        assert!(out[1].get("supplierId").is_none());
    }

    #[test]
    fn group_first_keeps_first_occurrence_order() {
        let rows = vec![
            json!({"_id": "b", "n": 1}),
            json!({"_id": "a", "n": 2}),
            json!({"_id": "b", "n": 3}),
        ];
        let out = run(rows, &[Stage::GroupFirst { key: "_id".into() }]);
        assert_eq!(out, vec![json!({"_id": "b", "n": 1}), json!({"_id": "a", "n": 2})]);
    }

    #[test]
    fn sort_skip_limit_count() {
        let rows: Vec<Value> = (1..=7).map(|n| json!({"n": n})).collect();
        let page = run(
            rows.clone(),
            &[
                Stage::Sort(vec![SortKey::new("n", SortDirection::Desc)]),
                Stage::Skip(2),
                Stage::Limit(3),
            ],
        );
        let ns: Vec<i64> = page.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![5, 4, 3]);

        let counted = run(rows, &[Stage::Count { field: "total".into() }]);
        assert_eq!(counted, vec![json!({"total": 7})]);
        assert!(run(vec![], &[Stage::Count { field: "total".into() }]).is_empty());
    }

    #[test]
    fn stash_and_restore_root() {
        let rows = vec![json!({"_id": 1, "lines": [1, 2]})];
        let out = run(
            rows,
            &[
                Stage::StashRoot { field: "__root".into() },
                Stage::Unwind {
                    path: "lines".into(),
                    preserve_null_and_empty: true,
                },
                Stage::GroupFirst { key: "_id".into() },
                Stage::RestoreRoot { field: "__root".into() },
            ],
        );
        assert_eq!(out, vec![json!({"_id": 1, "lines": [1, 2]})]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let stage = Stage::Match(Condition::Regex {
            field: "name".into(),
            pattern: "(".into(),
            case_insensitive: false,
        });
        let result = evaluate(vec![json!({"name": "x"})], &[stage], &Collections::new());
        assert!(matches!(result, Err(StoreError::InvalidPattern(_))));
    }

    #[test]
    fn stage_json_rendering() {
        let stage = Stage::Unwind {
            path: "attributes".into(),
            preserve_null_and_empty: true,
        };
        assert_eq!(
            stage.to_json(),
            json!({"$unwind": {"path": "$attributes", "preserveNullAndEmptyArrays": true}})
        );
    }
}
