//! Growing a seed set: same-document neighbours and shared-tag relations.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use crate::index::IndexManager;
use crate::sections::{neighbor_ids, Window};
use crate::store::JsonlStore;

pub const DEFAULT_RELATED: usize = 20;
pub const MAX_RELATED: usize = 50;

/// Non-seed ids sharing tags with the seeds, scored by the number of
/// distinct seed tags they carry. Sorted by score descending, then id.
pub fn related_by_tags(
    index: &IndexManager,
    seeds: &[String],
    limit: usize,
) -> Result<Vec<(String, usize)>> {
    let ids = index.ids()?;
    let tags = index.tags()?;

    let seed_tags: BTreeSet<&String> = seeds
        .iter()
        .filter_map(|id| ids.get(id))
        .flat_map(|entry| entry.tags.iter())
        .collect();

    let mut scores: BTreeMap<&String, usize> = BTreeMap::new();
    for tag in seed_tags {
        for id in tags.postings(tag) {
            if seeds.contains(id) {
                continue;
            }
            *scores.entry(id).or_default() += 1;
        }
    }

    let mut scored: Vec<(String, usize)> = scores.into_iter().map(|(id, n)| (id.clone(), n)).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(limit);
    Ok(scored)
}

#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    pub neighbors: Option<Window>,
    pub related_by_tags: bool,
    pub limit_related: Option<usize>,
    /// De-duplicate `expanded`, keeping first occurrences.
    pub unique_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub seeds: Vec<String>,
    pub neighbors: Vec<String>,
    pub related: Vec<String>,
    /// `seeds ++ neighbors ++ related`.
    pub expanded: Vec<String>,
}

pub fn expand(store: &JsonlStore, seeds: &[String], options: &ExpandOptions) -> Result<Expansion> {
    let mut neighbors = Vec::new();
    if let Some(window) = options.neighbors.filter(|w| !w.is_empty()) {
        for seed in seeds {
            neighbors.extend(
                neighbor_ids(store, seed, window)?
                    .into_iter()
                    .filter(|id| !seeds.contains(id)),
            );
        }
    }

    let related = if options.related_by_tags {
        let limit = options
            .limit_related
            .unwrap_or(DEFAULT_RELATED)
            .clamp(1, MAX_RELATED);
        related_by_tags(store.index(), seeds, limit)?
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    } else {
        Vec::new()
    };

    let mut expanded: Vec<String> = seeds
        .iter()
        .chain(neighbors.iter())
        .chain(related.iter())
        .cloned()
        .collect();
    if options.unique_only {
        let mut seen = HashSet::new();
        expanded.retain(|id| seen.insert(id.clone()));
    }

    Ok(Expansion {
        seeds: seeds.to_vec(),
        neighbors,
        related,
        expanded,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedStrategy {
    #[default]
    Tags,
    Document,
}

impl FromStr for RelatedStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tags" => Ok(RelatedStrategy::Tags),
            "document" => Ok(RelatedStrategy::Document),
            other => bail!("Unknown strategy: {}. Use tags or document.", other),
        }
    }
}

pub const DEFAULT_RELATED_SECTIONS: usize = 10;
pub const MAX_RELATED_SECTIONS: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedSection {
    pub id: String,
    pub topic: String,
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    Found {
        id: String,
        strategy: RelatedStrategy,
        related: Vec<RelatedSection>,
    },
    NotFound {
        id: String,
        error: &'static str,
    },
}

/// Sections related to one section, by document position or shared tags.
pub fn related(
    store: &JsonlStore,
    id: &str,
    strategy: RelatedStrategy,
    limit: Option<usize>,
) -> Result<Related> {
    let index = store.index();
    let ids = index.ids()?;
    let Some(entry) = ids.get(id) else {
        return Ok(Related::NotFound {
            id: id.to_string(),
            error: "not_found",
        });
    };
    let limit = limit
        .unwrap_or(DEFAULT_RELATED_SECTIONS)
        .clamp(1, MAX_RELATED_SECTIONS);

    let related = match strategy {
        RelatedStrategy::Document => {
            let window = Window {
                before: limit,
                after: limit,
            };
            let toc = index
                .documents()?
                .get(&entry.topic, &entry.document)
                .map(|d| d.sections.clone())
                .unwrap_or_default();
            neighbor_ids(store, id, window)?
                .into_iter()
                .filter_map(|nid| {
                    let e = ids.get(&nid)?;
                    let path = toc.iter().find(|row| row.id == nid).map(|row| row.section_path.clone());
                    Some(RelatedSection {
                        id: nid,
                        topic: e.topic.clone(),
                        document: e.document.clone(),
                        section_path: path,
                        section: None,
                        score: None,
                    })
                })
                .collect()
        }
        RelatedStrategy::Tags => related_by_tags(index, &[id.to_string()], limit)?
            .into_iter()
            .filter_map(|(rid, score)| {
                let e = ids.get(&rid)?;
                Some(RelatedSection {
                    id: rid.clone(),
                    topic: e.topic.clone(),
                    document: e.document.clone(),
                    section_path: None,
                    section: Some(e.section.clone()),
                    score: Some(score),
                })
            })
            .collect(),
    };

    Ok(Related::Found {
        id: id.to_string(),
        strategy,
        related,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_neighbor_window_on_middle_section() {
        let (_tmp, store) = fixture();
        let seed = ids(&["coding:coding/standards.md#1.2"]);
        let out = expand(
            &store,
            &seed,
            &ExpandOptions {
                neighbors: Some(Window::new(1, 1)),
                unique_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(out.expanded.len(), 3);
        assert_eq!(out.neighbors.len(), 2);
        let unique: HashSet<_> = out.expanded.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_shared_neighbors_collapse_when_unique() {
        let (_tmp, store) = fixture();
        let seeds = ids(&["coding:coding/standards.md#1", "coding:coding/standards.md#1.3"]);
        let options = ExpandOptions {
            neighbors: Some(Window::new(1, 1)),
            ..Default::default()
        };
        let raw = expand(&store, &seeds, &options).unwrap();
        // #1.2 (Errors) sits between both seeds in the TOC
        assert_eq!(
            raw.neighbors,
            ids(&[
                "coding:coding/standards.md#1.2",
                "coding:coding/standards.md#1.2",
                "coding:coding/standards.md#1.1",
            ])
        );
        assert_eq!(raw.expanded.len(), 5);

        let unique = expand(
            &store,
            &seeds,
            &ExpandOptions {
                unique_only: true,
                ..options
            },
        )
        .unwrap();
        assert_eq!(unique.expanded.len(), 4);
    }

    #[test]
    fn test_related_by_tags_excludes_seeds_and_ranks() {
        let (_tmp, store) = fixture();
        let seed = ids(&["coding:coding/standards.md#1.1"]);
        let related = related_by_tags(store.index(), &seed, 10).unwrap();
        assert!(related.iter().all(|(id, _)| !seed.contains(id)));
        assert!(related.windows(2).all(|w| w[0].1 >= w[1].1));
        // the ruleset sibling shares more tags than the notes sections
        assert_eq!(related[0].0, "coding:coding/standards.md#1.2");
        assert_eq!(related_by_tags(store.index(), &seed, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_related_document_strategy() {
        let (_tmp, store) = fixture();
        let out = related(&store, "notes:notes/ideas.md#1", RelatedStrategy::Document, None).unwrap();
        match out {
            Related::Found { related, .. } => {
                assert_eq!(related.len(), 1);
                assert_eq!(related[0].id, "notes:notes/ideas.md#2");
                assert_eq!(related[0].section_path, Some(vec!["Backlog".to_string()]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_related_unknown_id() {
        let (_tmp, store) = fixture();
        let out = related(&store, "ghost", RelatedStrategy::Tags, Some(3)).unwrap();
        assert_eq!(
            out,
            Related::NotFound {
                id: "ghost".into(),
                error: "not_found"
            }
        );
    }
}
