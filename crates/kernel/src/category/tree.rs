//! Category tree materialization.
//!
//! Categories are stored flat, each pointing at its parent. The builder
//! indexes every node by id, assigns children in one pass and assembles the
//! forest iteratively, so corrupt data (cycles, self-parenting) surfaces as a
//! [`TreeError`] instead of unbounded recursion.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::ID_FIELD;

/// Maximum nesting depth accepted by the builder.
pub const MAX_TREE_DEPTH: usize = 64;

const NAME_FIELD: &str = "name";
const PARENT_FIELD: &str = "parentId";

/// A category record before tree assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatCategory {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    /// Every other field of the stored record.
    pub fields: Map<String, Value>,
}

impl FlatCategory {
    pub fn new(id: &str, name: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            fields: Map::new(),
        }
    }

    /// Read a stored category document.
    ///
    /// `parentId` may be a plain id or an expanded parent record. Returns
    /// `None` when the document has no usable id.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let object = doc.as_object()?;
        let id = id_string(object.get(ID_FIELD)?)?;
        let name = object
            .get(NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parent_id = object.get(PARENT_FIELD).and_then(id_string);

        let fields = object
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), ID_FIELD | NAME_FIELD | PARENT_FIELD))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            id,
            name,
            parent_id,
            fields,
        })
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(ID_FIELD).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// A category with its children attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub children: Vec<CategoryNode>,
}

/// Data-integrity problems detected while building a tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("category {id} is its own ancestor")]
    Cycle { id: String },

    #[error("category id {id} appears more than once")]
    DuplicateId { id: String },

    #[error("category {id} is nested deeper than {max} levels")]
    TooDeep { id: String, max: usize },
}

/// Normalized form used when comparing ids; null, absent and blank are equal.
fn normalize(id: Option<&str>) -> Option<String> {
    let trimmed = id?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Assemble a forest from flat categories.
///
/// Roots are nodes with no parent. Nodes whose parent is not in the input
/// are dropped along with their descendants. Siblings keep input order.
pub fn build_tree(nodes: Vec<FlatCategory>) -> Result<Vec<CategoryNode>, TreeError> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let key = normalize(Some(node.id.as_str())).unwrap_or_default();
        if index.insert(key, i).is_some() {
            return Err(TreeError::DuplicateId {
                id: node.id.clone(),
            });
        }
    }

    let mut parent_of: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match normalize(node.parent_id.as_deref()) {
            None => roots.push(i),
            Some(parent) => {
                if let Some(&p) = index.get(&parent) {
                    parent_of[i] = Some(p);
                    children[p].push(i);
                }
            }
        }
    }

    // Pre-order walk from the roots, tracking depth.
    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = vec![false; nodes.len()];
    let mut stack: Vec<(usize, usize)> = roots.iter().rev().map(|&r| (r, 1)).collect();
    while let Some((i, depth)) = stack.pop() {
        if visited[i] {
            return Err(TreeError::Cycle {
                id: nodes[i].id.clone(),
            });
        }
        if depth > MAX_TREE_DEPTH {
            return Err(TreeError::TooDeep {
                id: nodes[i].id.clone(),
                max: MAX_TREE_DEPTH,
            });
        }
        visited[i] = true;
        order.push(i);
        stack.extend(children[i].iter().rev().map(|&c| (c, depth + 1)));
    }

    // Anything unreached either hangs off a missing parent or sits on a cycle.
    for start in (0..nodes.len()).filter(|&i| !visited[i]) {
        let mut chain = HashSet::new();
        let mut current = Some(start);
        while let Some(i) = current {
            if visited[i] {
                break;
            }
            if !chain.insert(i) {
                return Err(TreeError::Cycle {
                    id: nodes[i].id.clone(),
                });
            }
            current = parent_of[i];
        }
    }

    if order.len() < nodes.len() {
        tracing::debug!(
            dropped = nodes.len() - order.len(),
            "categories with missing parents left out of tree"
        );
    }

    let mut slots: Vec<Option<FlatCategory>> = nodes.into_iter().map(Some).collect();
    let mut built: Vec<Option<CategoryNode>> = vec![None; slots.len()];
    for &i in order.iter().rev() {
        let Some(flat) = slots[i].take() else {
            continue;
        };
        let kids = children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        built[i] = Some(CategoryNode {
            id: flat.id,
            name: flat.name,
            parent_id: flat.parent_id,
            fields: flat.fields,
            children: kids,
        });
    }

    Ok(roots.iter().filter_map(|&r| built[r].take()).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn chain_round_trip() {
        let tree = build_tree(vec![
            FlatCategory::new("A", "a", None),
            FlatCategory::new("B", "b", Some("A")),
            FlatCategory::new("C", "c", Some("B")),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["A"]);
        assert_eq!(ids(&tree[0].children), vec!["B"]);
        assert_eq!(ids(&tree[0].children[0].children), vec!["C"]);
        assert!(tree[0].children[0].children[0].children.is_empty());
    }

    #[test]
    fn input_order_is_irrelevant_and_siblings_keep_order() {
        let tree = build_tree(vec![
            FlatCategory::new("c2", "second child", Some("root")),
            FlatCategory::new("c1", "first child", Some("root")),
            FlatCategory::new("root", "root", None),
            FlatCategory::new("other", "other root", None),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["root", "other"]);
        assert_eq!(ids(&tree[0].children), vec!["c2", "c1"]);
    }

    #[test]
    fn parent_ids_compare_normalized() {
        let tree = build_tree(vec![
            FlatCategory::new("ABC", "a", Some("")),
            FlatCategory::new("b", "b", Some(" abc ")),
            FlatCategory::new("c", "c", Some("null")),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["ABC", "c"]);
        assert_eq!(ids(&tree[0].children), vec!["b"]);
    }

    #[test]
    fn orphans_are_dropped() {
        let tree = build_tree(vec![
            FlatCategory::new("A", "a", None),
            FlatCategory::new("X", "x", Some("missing")),
            FlatCategory::new("Y", "y", Some("X")),
        ])
        .unwrap();

        assert_eq!(ids(&tree), vec!["A"]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let result = build_tree(vec![
            FlatCategory::new("A", "a", None),
            FlatCategory::new("S", "s", Some("S")),
        ]);
        assert_eq!(result, Err(TreeError::Cycle { id: "S".into() }));
    }

    #[test]
    fn two_node_loop_is_a_cycle() {
        let result = build_tree(vec![
            FlatCategory::new("P", "p", Some("Q")),
            FlatCategory::new("Q", "q", Some("P")),
        ]);
        assert!(matches!(result, Err(TreeError::Cycle { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = build_tree(vec![
            FlatCategory::new("A", "a", None),
            FlatCategory::new("a", "again", None),
        ]);
        assert_eq!(result, Err(TreeError::DuplicateId { id: "a".into() }));
    }

    #[test]
    fn depth_is_bounded() {
        let mut nodes = vec![FlatCategory::new("n0", "n0", None)];
        for i in 1..=MAX_TREE_DEPTH {
            let parent = format!("n{}", i - 1);
            nodes.push(FlatCategory::new(&format!("n{i}"), "deep", Some(&parent)));
        }
        let result = build_tree(nodes);
        assert!(matches!(result, Err(TreeError::TooDeep { .. })));
    }

    #[test]
    fn from_document_reads_plain_and_expanded_parents() {
        let plain = FlatCategory::from_document(&json!({
            "_id": "c1", "name": "Fasteners", "parentId": "p1", "isActive": true
        }))
        .unwrap();
        assert_eq!(plain.parent_id.as_deref(), Some("p1"));
        assert_eq!(plain.fields.get("isActive"), Some(&json!(true)));

        let expanded = FlatCategory::from_document(&json!({
            "_id": "c2", "name": "Bolts", "parentId": {"_id": "c1", "name": "Fasteners"}
        }))
        .unwrap();
        assert_eq!(expanded.parent_id.as_deref(), Some("c1"));

        assert!(FlatCategory::from_document(&json!({"name": "no id"})).is_none());
    }

    #[test]
    fn node_serializes_with_children() {
        let tree = build_tree(vec![FlatCategory::new("A", "a", None)]).unwrap();
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            value,
            json!([{"id": "A", "name": "a", "parentId": null, "children": []}])
        );
    }
}
