//! Section and document reconstruction from the TOC and the record store.

use anyhow::Result;
use serde::Serialize;

use crate::models::{Corpus, TocEntry};
use crate::store::JsonlStore;

/// Largest neighbour window accepted on either side of a section.
pub const MAX_WINDOW: usize = 5;

/// Sections before/after a seed to include, each clamped to `0..=5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub before: usize,
    pub after: usize,
}

impl Window {
    pub fn new(before: usize, after: usize) -> Self {
        Self {
            before: before.min(MAX_WINDOW),
            after: after.min(MAX_WINDOW),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before == 0 && self.after == 0
    }
}

/// A section with its text, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionText {
    pub id: String,
    pub section_path: Vec<String>,
    pub text: String,
    pub tags: Vec<String>,
}

/// TOC ids within `window` of `id` in its document, seed excluded.
///
/// Empty when the id or its document is unknown.
pub fn neighbor_ids(store: &JsonlStore, id: &str, window: Window) -> Result<Vec<String>> {
    let index = store.index();
    let Some(entry) = index.ids()?.get(id) else {
        return Ok(Vec::new());
    };
    let Some(document) = index.documents()?.get(&entry.topic, &entry.document) else {
        return Ok(Vec::new());
    };
    let Some(position) = document.position(id) else {
        return Ok(Vec::new());
    };
    let start = position.saturating_sub(window.before);
    let end = (position + 1 + window.after).min(document.sections.len());
    Ok(document.sections[start..end]
        .iter()
        .filter(|s| s.id != id)
        .map(|s| s.id.clone())
        .collect())
}

/// Each resolvable id followed by its neighbours. Unknown ids are skipped.
pub fn sections_by_ids(
    store: &JsonlStore,
    ids: &[String],
    window: Option<Window>,
) -> Result<Vec<SectionText>> {
    let mut sections = Vec::new();
    for id in ids {
        let Some(chunk) = store.get(id)? else {
            continue;
        };
        sections.push(SectionText {
            id: chunk.id,
            section_path: chunk.headings,
            text: chunk.text,
            tags: chunk.tags,
        });

        let Some(window) = window.filter(|w| !w.is_empty()) else {
            continue;
        };
        for neighbor in neighbor_ids(store, id, window)? {
            if let Some(chunk) = store.get(&neighbor)? {
                sections.push(SectionText {
                    id: chunk.id,
                    section_path: chunk.headings,
                    text: chunk.text,
                    tags: chunk.tags,
                });
            }
        }
    }
    Ok(sections)
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentMeta {
    pub topic: String,
    pub document: String,
    pub corpus: Corpus,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub meta: DocumentMeta,
    pub sections: Vec<SectionText>,
}

/// Whether a TOC row matches one of the selectors (id or `A > B` path).
fn selected(row: &TocEntry, selectors: &[String]) -> bool {
    let path = row.section_path.join(" > ");
    selectors.iter().any(|s| *s == row.id || *s == path)
}

/// A whole document, or the selected sections of it. `None` if unknown.
pub fn document(
    store: &JsonlStore,
    topic: &str,
    path: &str,
    selectors: &[String],
) -> Result<Option<DocumentView>> {
    let Some(entry) = store.index().documents()?.get(topic, path) else {
        return Ok(None);
    };

    let mut sections = Vec::new();
    for row in &entry.sections {
        if !selectors.is_empty() && !selected(row, selectors) {
            continue;
        }
        let chunk = store.get(&row.id)?;
        sections.push(SectionText {
            id: row.id.clone(),
            section_path: row.section_path.clone(),
            text: chunk.as_ref().map(|c| c.text.clone()).unwrap_or_default(),
            tags: chunk.map(|c| c.tags).unwrap_or_default(),
        });
    }

    Ok(Some(DocumentView {
        meta: DocumentMeta {
            topic: entry.topic.clone(),
            document: path.to_string(),
            corpus: entry.corpus,
            tags: entry.tags.clone(),
        },
        sections,
    }))
}

/// The raw TOC of a document; empty if unknown.
pub fn document_sections(store: &JsonlStore, topic: &str, path: &str) -> Result<Vec<TocEntry>> {
    Ok(store
        .index()
        .documents()?
        .get(topic, path)
        .map(|e| e.sections.clone())
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Citation {
    Found {
        id: String,
        topic: String,
        document: String,
        anchor: String,
        section_path: Vec<String>,
        tags: Vec<String>,
    },
    NotFound {
        id: String,
        error: &'static str,
    },
}

/// Citation metadata per id, with a `not_found` marker for unknown ids.
pub fn cite(store: &JsonlStore, ids: &[String]) -> Result<Vec<Citation>> {
    let index = store.index().ids()?;
    let mut citations = Vec::with_capacity(ids.len());
    for id in ids {
        let citation = match (index.get(id), store.get(id)?) {
            (Some(entry), Some(chunk)) => Citation::Found {
                id: id.clone(),
                topic: entry.topic.clone(),
                document: entry.document.clone(),
                anchor: entry.section.clone(),
                section_path: chunk.headings,
                tags: entry.tags.clone(),
            },
            _ => Citation::NotFound {
                id: id.clone(),
                error: "not_found",
            },
        };
        citations.push(citation);
    }
    Ok(citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_window_clamped() {
        assert_eq!(Window::new(9, 2), Window { before: 5, after: 2 });
    }

    #[test]
    fn test_neighbors_of_middle_section() {
        let (_tmp, store) = fixture();
        // TOC order follows heading titles: Errors, Example, Naming
        let around = neighbor_ids(&store, "coding:coding/standards.md#1.2", Window::new(1, 1)).unwrap();
        assert_eq!(
            around,
            ids(&["coding:coding/standards.md#1", "coding:coding/standards.md#1.3"])
        );
    }

    #[test]
    fn test_neighbors_clip_at_document_edges() {
        let (_tmp, store) = fixture();
        let around = neighbor_ids(&store, "notes:notes/ideas.md#1", Window::new(5, 5)).unwrap();
        assert_eq!(around, ids(&["notes:notes/ideas.md#2"]));
    }

    #[test]
    fn test_sections_by_ids_skips_unknown() {
        let (_tmp, store) = fixture();
        let out = sections_by_ids(
            &store,
            &ids(&["nope:x.md#1", "notes:notes/ideas.md#2"]),
            Some(Window::new(0, 1)),
        )
        .unwrap();
        let got: Vec<_> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(got, vec!["notes:notes/ideas.md#2", "notes:notes/ideas.md#1"]);
        assert_eq!(out[0].section_path, vec!["Backlog"]);
    }

    #[test]
    fn test_document_selectors() {
        let (_tmp, store) = fixture();
        let view = document(
            &store,
            "coding",
            "coding/standards.md",
            &ids(&["Coding Standards > Errors", "coding:coding/standards.md#1.1"]),
        )
        .unwrap()
        .unwrap();
        let got: Vec<_> = view.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            got,
            vec!["coding:coding/standards.md#1.2", "coding:coding/standards.md#1.1"]
        );
        assert_eq!(view.meta.corpus, Corpus::Ruleset);
        assert!(document(&store, "coding", "missing.md", &[]).unwrap().is_none());
    }

    #[test]
    fn test_document_sections_toc() {
        let (_tmp, store) = fixture();
        assert_eq!(document_sections(&store, "coding", "coding/standards.md").unwrap().len(), 4);
        assert!(document_sections(&store, "coding", "missing.md").unwrap().is_empty());
    }

    #[test]
    fn test_cite_marks_unknown() {
        let (_tmp, store) = fixture();
        let out = cite(&store, &ids(&["notes:notes/ideas.md#1", "ghost"])).unwrap();
        match &out[0] {
            Citation::Found { anchor, section_path, .. } => {
                assert_eq!(anchor, "1");
                assert_eq!(section_path, &vec!["Ideas".to_string()]);
            }
            other => panic!("expected citation, got {:?}", other),
        }
        let json = serde_json::to_value(&out[1]).unwrap();
        assert_eq!(json, serde_json::json!({"id": "ghost", "error": "not_found"}));
    }
}
