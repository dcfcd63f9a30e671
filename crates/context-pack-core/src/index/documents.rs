use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{index_dir, load_json, save_json, Persist};
use crate::models::{document_key, natural_cmp, Chunk, Corpus, DocumentEntry, TocEntry};

/// `topic:path` → [`DocumentEntry`]. Persisted as `index/documents.json`.
///
/// The TOC of each entry stays sorted by its heading path joined with `.`
/// under [`natural_cmp`]. Rows with equal paths keep insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentIndex {
    entries: BTreeMap<String, DocumentEntry>,
}

impl DocumentIndex {
    pub fn get(&self, topic: &str, path: &str) -> Option<&DocumentEntry> {
        self.entries.get(&document_key(topic, path))
    }

    pub fn get_key(&self, key: &str) -> Option<&DocumentEntry> {
        self.entries.get(key)
    }

    pub fn index(&mut self, chunk: &Chunk) {
        let row = TocEntry {
            id: chunk.id.clone(),
            section_path: chunk.headings.clone(),
            section: chunk.section.clone(),
        };

        let key = chunk.document_key();
        let Some(entry) = self.entries.get_mut(&key) else {
            self.entries.insert(
                key,
                DocumentEntry {
                    topic: chunk.topic.clone(),
                    tags: chunk.tags.clone(),
                    corpus: chunk.corpus(),
                    sections: vec![row],
                },
            );
            return;
        };

        for tag in &chunk.tags {
            if !entry.tags.contains(tag) {
                entry.tags.push(tag.clone());
            }
        }
        if entry.corpus == Corpus::Knowledge {
            entry.corpus = Corpus::from_tags(&entry.tags);
        }
        entry.sections.push(row);
        entry
            .sections
            .sort_by(|a, b| natural_cmp(&a.section_path.join("."), &b.section_path.join(".")));
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_topic(&mut self, topic: &str) {
        self.entries.retain(|_, e| e.topic != topic);
    }
}

impl Persist for DocumentIndex {
    fn load(root: &Path) -> Result<Self> {
        load_json(&index_dir(root).join("documents.json"))
    }

    fn save(&self, root: &Path) -> Result<()> {
        save_json(&index_dir(root).join("documents.json"), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrontMatter;

    fn chunk(section: &str, tags: &[&str]) -> Chunk {
        Chunk {
            id: format!("t:doc.md#{}", section),
            topic: "t".into(),
            path: "doc.md".into(),
            section: section.into(),
            headings: vec![format!("H{}", section)],
            rule: None,
            text: "x".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            data: FrontMatter::new(),
            rank: None,
            embedding: vec![],
        }
    }

    #[test]
    fn test_first_chunk_creates_entry() {
        let mut index = DocumentIndex::default();
        index.index(&chunk("1", &["t", "knowledge base"]));
        let entry = index.get("t", "doc.md").unwrap();
        assert_eq!(entry.sections.len(), 1);
        assert_eq!(entry.corpus, Corpus::Knowledge);
    }

    #[test]
    fn test_tags_union_and_corpus_upgrade() {
        let mut index = DocumentIndex::default();
        index.index(&chunk("1", &["t", "knowledge base"]));
        index.index(&chunk("2", &["t", "ruleset"]));
        let entry = index.get_key("t:doc.md").unwrap();
        assert_eq!(entry.tags, vec!["t", "knowledge base", "ruleset"]);
        assert_eq!(entry.corpus, Corpus::Ruleset);
    }

    #[test]
    fn test_toc_sorted_by_heading_path() {
        let mut index = DocumentIndex::default();
        for (section, headings) in [
            ("1", vec!["Guide"]),
            ("1.1", vec!["Guide", "Setup"]),
            ("1.2", vec!["Guide", "Errors"]),
            ("1.3", vec!["Guide", "Step 10"]),
            ("1.4", vec!["Guide", "Step 9"]),
        ] {
            let mut c = chunk(section, &["t"]);
            c.headings = headings.into_iter().map(String::from).collect();
            index.index(&c);
        }
        let order: Vec<_> = index
            .get("t", "doc.md")
            .unwrap()
            .sections
            .iter()
            .map(|s| s.section.as_str())
            .collect();
        assert_eq!(order, vec!["1", "1.2", "1.1", "1.4", "1.3"]);
    }
}
