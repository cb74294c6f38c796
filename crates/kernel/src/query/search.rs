//! Nested free-text search.
//!
//! Search paths may cross array-valued segments
//! (`attributes.pricing.marketplaceName`). Every array prefix is flattened
//! once, the term is matched case-insensitively across all paths, and the
//! resulting fan-out is collapsed back to one row per record with the
//! original document restored.

use std::collections::HashSet;

use crate::record::ID_FIELD;
use crate::store::{Condition, Stage};

/// Field holding the pre-flatten copy of each record.
pub const ROOT_STASH_FIELD: &str = "__searchRoot";

/// Build the search stages for `term` over `paths`.
///
/// Returns no stages for a blank term or an empty path list.
pub fn search_stages(term: &str, paths: &[String]) -> Vec<Stage> {
    let term = term.trim();
    if term.is_empty() || paths.is_empty() {
        return Vec::new();
    }

    let unwinds = flatten_stages(paths);
    let fans_out = !unwinds.is_empty();

    let mut stages = Vec::with_capacity(unwinds.len() + 4);
    if fans_out {
        stages.push(Stage::StashRoot {
            field: ROOT_STASH_FIELD.to_string(),
        });
    }
    stages.extend(unwinds);

    let alternatives = paths
        .iter()
        .map(|path| Condition::contains_ci(path.as_str(), term))
        .collect();
    stages.push(Stage::Match(Condition::Or(alternatives)));

    if fans_out {
        stages.push(Stage::GroupFirst {
            key: ID_FIELD.to_string(),
        });
        stages.push(Stage::RestoreRoot {
            field: ROOT_STASH_FIELD.to_string(),
        });
    }

    stages
}

/// One unwind per distinct proper prefix, in first-seen order.
fn flatten_stages(paths: &[String]) -> Vec<Stage> {
    let mut visited = HashSet::new();
    let mut stages = Vec::new();

    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        for depth in 1..segments.len() {
            let prefix = segments[..depth].join(".");
            if visited.insert(prefix.clone()) {
                stages.push(Stage::Unwind {
                    path: prefix,
                    preserve_null_and_empty: true,
                });
            }
        }
    }

    stages
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::pipeline::{Collections, evaluate};
    use serde_json::json;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_term_adds_nothing() {
        assert!(search_stages("  ", &paths(&["name"])).is_empty());
        assert!(search_stages("acme", &[]).is_empty());
    }

    #[test]
    fn flat_paths_skip_dedup() {
        let stages = search_stages("acme", &paths(&["name", "code"]));
        assert_eq!(stages.len(), 1);
        assert!(matches!(&stages[0], Stage::Match(Condition::Or(alts)) if alts.len() == 2));
    }

    #[test]
    fn shared_prefixes_flatten_once() {
        let stages = search_stages(
            "amazon",
            &paths(&[
                "attributes.pricing.marketplaceName",
                "attributes.pricing.sku",
                "attributes.label",
            ]),
        );
        let unwound: Vec<&str> = stages
            .iter()
            .filter_map(|s| match s {
                Stage::Unwind { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(unwound, vec!["attributes", "attributes.pricing"]);
        assert!(matches!(stages.first(), Some(Stage::StashRoot { .. })));
        assert!(matches!(stages.last(), Some(Stage::RestoreRoot { .. })));
    }

    #[test]
    fn match_inside_array_returns_record_once_with_array_intact() {
        let record = json!({
            "_id": "p1",
            "name": "Widget",
            "attributes": [
                {"pricing": [{"marketplaceName": "Amazon"}, {"marketplaceName": "eBay"}]},
                {"pricing": [{"marketplaceName": "Etsy"}]},
                {"pricing": []},
            ],
        });
        let other = json!({"_id": "p2", "name": "Gadget", "attributes": []});

        let stages = search_stages("amaz", &paths(&["name", "attributes.pricing.marketplaceName"]));
        let out = evaluate(vec![record.clone(), other], &stages, &Collections::new()).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0], record);
    }

    #[test]
    fn several_matching_elements_still_yield_one_row() {
        let record = json!({
            "_id": "p1",
            "tags": [{"label": "red"}, {"label": "dark red"}, {"label": "blue"}],
        });
        let stages = search_stages("RED", &paths(&["tags.label"]));
        let out = evaluate(vec![record.clone()], &stages, &Collections::new()).unwrap();

        assert_eq!(out, vec![record]);
    }
}
