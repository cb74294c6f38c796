//! List request parameters.

use super::filter::RawValue;
use crate::record::CREATED_AT_FIELD;
use crate::store::SortDirection;

/// Default page size when the caller does not send `limit`.
pub const DEFAULT_LIMIT: u64 = 10;

/// Value of `filter` that disables pagination.
pub const BYPASS_SENTINEL: &str = "all";

/// Parsed list parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub page: u64,
    pub limit: u64,
    pub sort_by: String,
    pub order: SortDirection,
    pub search: Option<String>,
    pub bypass_pagination: bool,
    pub include_stats: bool,
    /// Every non-reserved parameter, in first-seen order. Repeated keys are
    /// gathered into a list.
    pub filters: Vec<(String, RawValue)>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            sort_by: CREATED_AT_FIELD.to_string(),
            order: SortDirection::Desc,
            search: None,
            bypass_pagination: false,
            include_stats: false,
            filters: Vec::new(),
        }
    }
}

impl ListParams {
    /// Parse query-string pairs.
    ///
    /// `page` and `limit` fall back to their defaults when missing, zero or
    /// not numeric.
    pub fn from_pairs<I>(pairs: I, default_limit: u64) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self {
            limit: default_limit.max(1),
            ..Self::default()
        };

        for (key, value) in pairs {
            match key.as_str() {
                "page" => params.page = parse_positive(&value).unwrap_or(1),
                "limit" => params.limit = parse_positive(&value).unwrap_or(params.limit),
                "sortBy" => {
                    let field = value.trim();
                    if !field.is_empty() {
                        params.sort_by = field.to_string();
                    }
                }
                "order" => {
                    params.order = if value.trim().eq_ignore_ascii_case("asc") {
                        SortDirection::Asc
                    } else {
                        SortDirection::Desc
                    };
                }
                "search" => {
                    let term = value.trim();
                    params.search = (!term.is_empty()).then(|| term.to_string());
                }
                "filter" => params.bypass_pagination = value == BYPASS_SENTINEL,
                "includeStats" => params.include_stats = value == "true",
                _ => params.push_filter(key, value),
            }
        }

        params
    }

    fn push_filter(&mut self, key: String, value: String) {
        match self.filters.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, RawValue::List(items))) => items.push(value),
            Some((_, slot)) => {
                let previous = match &mut *slot {
                    RawValue::Text(s) => std::mem::take(s),
                    _ => String::new(),
                };
                *slot = RawValue::List(vec![previous, value]);
            }
            None => self.filters.push((key, RawValue::Text(value))),
        }
    }
}

fn parse_positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pairs: &[(&str, &str)]) -> ListParams {
        ListParams::from_pairs(
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            DEFAULT_LIMIT,
        )
    }

    #[test]
    fn defaults() {
        let params = parse(&[]);
        assert_eq!(params, ListParams::default());
        assert_eq!(params.sort_by, "createdAt");
        assert_eq!(params.order, SortDirection::Desc);
    }

    #[test]
    fn numeric_coercion_falls_back() {
        let params = parse(&[("page", "3"), ("limit", "25")]);
        assert_eq!((params.page, params.limit), (3, 25));

        let params = parse(&[("page", "zero"), ("limit", "0")]);
        assert_eq!((params.page, params.limit), (1, DEFAULT_LIMIT));
    }

    #[test]
    fn only_all_bypasses_pagination() {
        assert!(parse(&[("filter", "all")]).bypass_pagination);
        assert!(!parse(&[("filter", "some")]).bypass_pagination);
    }

    #[test]
    fn sort_and_order() {
        let params = parse(&[("sortBy", "orderDate"), ("order", "ASC")]);
        assert_eq!(params.sort_by, "orderDate");
        assert_eq!(params.order, SortDirection::Asc);
    }

    #[test]
    fn include_stats_requires_literal_true() {
        assert!(parse(&[("includeStats", "true")]).include_stats);
        assert!(!parse(&[("includeStats", "1")]).include_stats);
    }

    #[test]
    fn other_parameters_become_filters() {
        let params = parse(&[
            ("status", "OPEN"),
            ("supplierIds", "a"),
            ("supplierIds", "b"),
            ("supplierIds", "c"),
        ]);
        assert_eq!(
            params.filters,
            vec![
                ("status".to_string(), RawValue::Text("OPEN".into())),
                (
                    "supplierIds".to_string(),
                    RawValue::List(vec!["a".into(), "b".into(), "c".into()])
                ),
            ]
        );
    }

    #[test]
    fn blank_search_is_ignored() {
        assert_eq!(parse(&[("search", "   ")]).search, None);
        assert_eq!(parse(&[("search", " acme ")]).search, Some("acme".into()));
    }
}
