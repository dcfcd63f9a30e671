//! Sanity checks for topic and tag filters before searching.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::search::{suggest_tags, Filters};
use crate::store::JsonlStore;

const SUGGESTIONS_PER_TAG: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Split {
    pub ok: Vec<String>,
    pub missing: Vec<String>,
}

impl Split {
    fn from_list(list: &[String], known: impl Fn(&str) -> bool) -> Self {
        let (ok, missing) = list.iter().cloned().partition(|item: &String| known(item.as_str()));
        Self { ok, missing }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub topics: Split,
    pub include_tags: Split,
    pub require_tags: Split,
    pub exclude_tags: Split,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<BTreeMap<String, Vec<String>>>,
}

/// Split each filter list into known and missing entries; optionally
/// suggest known tags for every missing one.
pub fn validate_filters(
    store: &JsonlStore,
    filters: &Filters,
    suggest_on_missing: bool,
) -> Result<FilterReport> {
    let tags = store.index().tags()?;
    let topics = store.topics();
    let known_tag = |t: &str| tags.contains(t);

    let report = FilterReport {
        topics: Split::from_list(&filters.topics, |t| topics.iter().any(|k| k == t)),
        include_tags: Split::from_list(&filters.include_tags, known_tag),
        require_tags: Split::from_list(&filters.require_tags, known_tag),
        exclude_tags: Split::from_list(&filters.exclude_tags, known_tag),
        suggestions: None,
    };
    if !suggest_on_missing {
        return Ok(report);
    }

    let mut wanted: Vec<String> = Vec::new();
    for tag in report
        .include_tags
        .missing
        .iter()
        .chain(&report.require_tags.missing)
        .chain(&report.exclude_tags.missing)
    {
        if !wanted.contains(tag) {
            wanted.push(tag.clone());
        }
    }
    let suggestions = suggest_tags(store.index(), &wanted, &[], Some(SUGGESTIONS_PER_TAG))?
        .into_iter()
        .map(|s| (s.phrase, s.tags))
        .collect();

    Ok(FilterReport {
        suggestions: Some(suggestions),
        ..report
    })
}
