use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{index_dir, load_json, save_json, Persist};
use crate::models::Chunk;

/// Tags never added to the postings lists.
pub const TAG_STOPLIST: &[&str] = &["readme"];

/// Inverted index tag → ordered chunk ids. Persisted as `index/tags.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagIndex {
    postings: BTreeMap<String, Vec<String>>,
}

impl TagIndex {
    /// Postings list of `tag`; empty when the tag is unknown.
    pub fn postings(&self, tag: &str) -> &[String] {
        self.postings.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.postings.contains_key(tag)
    }

    pub fn index(&mut self, chunk: &Chunk) {
        for tag in &chunk.tags {
            if tag.is_empty() || TAG_STOPLIST.contains(&tag.as_str()) {
                continue;
            }
            let ids = self.postings.entry(tag.clone()).or_default();
            if !ids.contains(&chunk.id) {
                ids.push(chunk.id.clone());
            }
        }
    }

    /// Union of the postings of every tag in `tags`.
    pub fn union_of(&self, tags: &[String]) -> BTreeSet<String> {
        tags.iter()
            .flat_map(|t| self.postings(t).iter().cloned())
            .collect()
    }

    /// `(tag, postings)` in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.postings.iter()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Drop `ids` from every postings list; lists left empty are removed.
    pub fn remove_ids(&mut self, ids: &BTreeSet<String>) {
        if ids.is_empty() {
            return;
        }
        for list in self.postings.values_mut() {
            list.retain(|id| !ids.contains(id));
        }
        self.postings.retain(|_, list| !list.is_empty());
    }
}

impl Persist for TagIndex {
    fn load(root: &Path) -> Result<Self> {
        load_json(&index_dir(root).join("tags.json"))
    }

    fn save(&self, root: &Path) -> Result<()> {
        save_json(&index_dir(root).join("tags.json"), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrontMatter;

    fn chunk(id: &str, tags: &[&str]) -> Chunk {
        Chunk {
            id: id.into(),
            topic: "t".into(),
            path: "README.md".into(),
            section: "1".into(),
            headings: vec![],
            rule: None,
            text: "x".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            data: FrontMatter::new(),
            rank: None,
            embedding: vec![],
        }
    }

    #[test]
    fn test_stoplisted_and_empty_tags_skipped() {
        let mut index = TagIndex::default();
        index.index(&chunk("a", &["t", "readme", ""]));
        assert!(index.contains("t"));
        assert!(!index.contains("readme"));
        assert!(!index.contains(""));
    }

    #[test]
    fn test_indexing_is_idempotent_per_tag() {
        let mut index = TagIndex::default();
        let c = chunk("a", &["x"]);
        index.index(&c);
        index.index(&c);
        assert_eq!(index.postings("x"), &["a".to_string()]);
    }

    #[test]
    fn test_union_of() {
        let mut index = TagIndex::default();
        index.index(&chunk("b", &["x"]));
        index.index(&chunk("a", &["y"]));
        index.index(&chunk("c", &["z"]));
        let union = index.union_of(&["x".into(), "y".into(), "missing".into()]);
        assert_eq!(union.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
