//! Search over the indexes: chunk search, document search, tag browsing.
//!
//! # Chunk search
//!
//! 1. **Candidates.** Set algebra over ordered id sets: topic filter
//!    (union of TOC ids), include tags (OR), require tags (AND, one at a
//!    time), exclude tags (NOT). With no filter at all, every indexed id.
//! 2. **Query vector.** Embedded once, unless the mode is `simple`.
//! 3. **Scoring.** Candidates without a vector row are dropped. Semantic:
//!    cosine to the query. Lexical: `+0.5` body contains the lowercased
//!    query, `+0.25` a heading contains it, `+0.2` for fenced code when
//!    snippets are preferred. Components add up.
//! 4. **Ordering.** Score descending, then id ascending.
//! 5. **Pagination.** `take = clamp(limit, 1, 50)`; the cursor is the
//!    base64 of a decimal offset, and bad cursors read as offset 0.

use anyhow::{bail, Result};
use base64::Engine;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::chunk::tagify;
use crate::embedding::{cosine, embed_query, Embedder};
use crate::index::IndexManager;
use crate::models::{Corpus, DocumentEntry};
use crate::store::JsonlStore;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;
pub const DEFAULT_DOCUMENT_LIMIT: usize = 50;
pub const MAX_DOCUMENT_LIMIT: usize = 500;

const BODY_MATCH: f64 = 0.5;
const HEADING_MATCH: f64 = 0.25;
const CODE_BONUS: f64 = 0.2;

/// Which score components to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Lexical only; no embedding call.
    Simple,
    /// Embedding only.
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    fn lexical(&self) -> bool {
        *self != SearchMode::Semantic
    }

    fn semantic(&self) -> bool {
        *self != SearchMode::Simple
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(SearchMode::Simple),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use simple, semantic, or hybrid.",
                other
            ),
        }
    }
}

/// Topic and tag constraints shared by every search entry point.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub topics: Vec<String>,
    /// OR: at least one of these tags.
    pub include_tags: Vec<String>,
    /// AND: every one of these tags.
    pub require_tags: Vec<String>,
    /// NOT: none of these tags.
    pub exclude_tags: Vec<String>,
}

impl Filters {
    /// Whether a tag set passes the include/require/exclude rules.
    pub fn accepts_tags(&self, tags: &[String]) -> bool {
        let has = |t: &String| tags.contains(t);
        (self.include_tags.is_empty() || self.include_tags.iter().any(has))
            && self.require_tags.iter().all(has)
            && !self.exclude_tags.iter().any(has)
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub filters: Filters,
    /// Bias toward sections containing fenced code.
    pub snippet_only: bool,
    pub mode: SearchMode,
    pub limit: usize,
    pub cursor: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            filters: Filters::default(),
            snippet_only: false,
            mode: SearchMode::Hybrid,
            limit: DEFAULT_SEARCH_LIMIT,
            cursor: None,
        }
    }
}

/// One scored section.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub topic: String,
    pub document: String,
    pub section_path: Vec<String>,
    pub tags: Vec<String>,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub score: f64,
    pub corpus: Corpus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Encode a result offset as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(offset.to_string())
}

/// Decode a cursor; missing or malformed cursors mean offset 0.
pub fn decode_cursor(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| base64::engine::general_purpose::STANDARD.decode(c.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Slice one page out of `items` and compute the follow-up cursor.
pub fn paginate<T>(items: Vec<T>, cursor: Option<&str>, take: usize) -> (Vec<T>, Option<String>) {
    let total = items.len();
    let offset = decode_cursor(cursor).min(total);
    let page: Vec<T> = items.into_iter().skip(offset).take(take).collect();
    let next = offset + page.len();
    let cursor = (next < total).then(|| encode_cursor(next));
    (page, cursor)
}

/// Candidate ids for `filters`, in ascending order.
pub fn candidate_ids(index: &IndexManager, filters: &Filters) -> Result<BTreeSet<String>> {
    let ids = index.ids()?;
    let tags = index.tags()?;
    let mut candidates: Option<BTreeSet<String>> = None;

    if !filters.topics.is_empty() {
        let documents = index.documents()?;
        candidates = Some(
            documents
                .iter()
                .filter(|(_, entry)| filters.topics.contains(&entry.topic))
                .flat_map(|(_, entry)| entry.sections.iter().map(|s| s.id.clone()))
                .collect(),
        );
    }

    if !filters.include_tags.is_empty() {
        let union = tags.union_of(&filters.include_tags);
        candidates = Some(match candidates {
            Some(current) => current.intersection(&union).cloned().collect(),
            None => union,
        });
    }

    for tag in &filters.require_tags {
        let posting: BTreeSet<&str> = tags.postings(tag).iter().map(String::as_str).collect();
        let next: BTreeSet<String> = match candidates {
            Some(current) => current
                .into_iter()
                .filter(|id| posting.contains(id.as_str()))
                .collect(),
            None => posting.iter().map(|id| id.to_string()).collect(),
        };
        let empty = next.is_empty();
        candidates = Some(next);
        if empty {
            break;
        }
    }

    if !filters.exclude_tags.is_empty() {
        let excluded = tags.union_of(&filters.exclude_tags);
        let base = candidates.unwrap_or_else(|| ids.ids().cloned().collect());
        candidates = Some(base.difference(&excluded).cloned().collect());
    }

    Ok(candidates.unwrap_or_else(|| ids.ids().cloned().collect()))
}

/// Lexical score of a section body and breadcrumb against a lowercased query.
pub fn lexical_score(text: &str, headings: &[String], query_lower: &str, snippet_only: bool) -> f64 {
    let mut score = 0.0;
    if text.to_lowercase().contains(query_lower) {
        score += BODY_MATCH;
    }
    if headings
        .iter()
        .any(|h| h.to_lowercase().contains(query_lower))
    {
        score += HEADING_MATCH;
    }
    if snippet_only && text.contains("```") {
        score += CODE_BONUS;
    }
    score
}

/// Language tag of the first fenced code block in `text`.
pub fn fence_language(text: &str) -> Result<Option<String>> {
    static FENCE_LANGUAGE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let re = FENCE_LANGUAGE
        .get_or_init(|| Regex::new(r"```([a-zA-Z0-9+_-]+)"))
        .as_ref()
        .map_err(Clone::clone)?;
    Ok(re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Hybrid section search.
pub async fn search(
    store: &JsonlStore,
    embedder: &dyn Embedder,
    query: &str,
    options: &SearchOptions,
) -> Result<SearchPage> {
    let index = store.index();
    let candidates = candidate_ids(index, &options.filters)?;

    let query_vec = if options.mode.semantic() {
        Some(embed_query(embedder, query).await?)
    } else {
        None
    };
    let query_lower = query.to_lowercase();
    let embeddings = index.embeddings()?;

    let mut scored: Vec<(String, f64)> = Vec::new();
    for id in candidates {
        let Some(vector) = embeddings.vector(&id) else {
            continue;
        };
        let mut score = 0.0;
        if let Some(q) = &query_vec {
            score += cosine(q, vector);
        }
        if options.mode.lexical() {
            if let Some(chunk) = store.get(&id)? {
                score += lexical_score(&chunk.text, &chunk.headings, &query_lower, options.snippet_only);
            }
        }
        scored.push((id, score));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    tracing::debug!(query, candidates = scored.len(), mode = ?options.mode, "scored candidates");

    let take = options.limit.clamp(1, MAX_SEARCH_LIMIT);
    let (page, next_cursor) = paginate(scored, options.cursor.as_deref(), take);

    let ids = index.ids()?;
    let mut hits = Vec::with_capacity(page.len());
    for (id, score) in page {
        let Some(entry) = ids.get(&id) else {
            continue;
        };
        let chunk = store.get(&id)?;
        let (section_path, snippet) = match &chunk {
            Some(c) => (c.headings.clone(), c.text.clone()),
            None => (Vec::new(), String::new()),
        };
        let language = match &chunk {
            Some(c) => fence_language(&c.text)?,
            None => None,
        };
        hits.push(SearchHit {
            id,
            topic: entry.topic.clone(),
            document: entry.document.clone(),
            section_path,
            tags: entry.tags.clone(),
            snippet,
            language,
            score,
            corpus: entry.corpus,
        });
    }

    Ok(SearchPage { hits, next_cursor })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentSort {
    /// By document key (`topic:path`).
    #[default]
    Title,
    Sections,
    Topic,
}

impl FromStr for DocumentSort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(DocumentSort::Title),
            "sections" => Ok(DocumentSort::Sections),
            "topic" => Ok(DocumentSort::Topic),
            other => bail!("Unknown sort: {}. Use title, sections, or topic.", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => bail!("Unknown order: {}. Use asc or desc.", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentQuery {
    pub filters: Filters,
    pub corpus: Option<Corpus>,
    pub sort: DocumentSort,
    pub order: SortOrder,
    pub limit: usize,
    pub cursor: Option<String>,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            filters: Filters::default(),
            corpus: None,
            sort: DocumentSort::Title,
            order: SortOrder::Asc,
            limit: DEFAULT_DOCUMENT_LIMIT,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Document key, `topic:path`.
    pub document: String,
    #[serde(flatten)]
    pub entry: DocumentEntry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<DocumentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Filter, sort and paginate the document index.
///
/// Ties on the sort field fall back to the document key, so `desc` is
/// always the exact reverse of `asc`.
pub fn search_documents(index: &IndexManager, query: &DocumentQuery) -> Result<DocumentPage> {
    let filters = &query.filters;
    let mut documents: Vec<DocumentSummary> = index
        .documents()?
        .iter()
        .filter(|(_, e)| query.corpus.map_or(true, |c| e.corpus == c))
        .filter(|(_, e)| filters.topics.is_empty() || filters.topics.contains(&e.topic))
        .filter(|(_, e)| filters.accepts_tags(&e.tags))
        .map(|(key, e)| DocumentSummary {
            document: key.clone(),
            entry: e.clone(),
        })
        .collect();

    documents.sort_by(|a, b| {
        let primary = match query.sort {
            DocumentSort::Title => Ordering::Equal,
            DocumentSort::Sections => a.entry.sections.len().cmp(&b.entry.sections.len()),
            DocumentSort::Topic => a.entry.topic.cmp(&b.entry.topic),
        };
        primary.then_with(|| a.document.cmp(&b.document))
    });
    if query.order == SortOrder::Desc {
        documents.reverse();
    }

    let take = query.limit.clamp(1, MAX_DOCUMENT_LIMIT);
    let (documents, next_cursor) = paginate(documents, query.cursor.as_deref(), take);
    Ok(DocumentPage {
        documents,
        next_cursor,
    })
}

/// Tag names by descending postings size, optionally substring-filtered.
pub fn search_tags(index: &IndexManager, query: Option<&str>, limit: Option<usize>) -> Result<Vec<String>> {
    let needle = query.map(str::to_lowercase);
    let mut counted: Vec<(&String, usize)> = index
        .tags()?
        .iter()
        .filter(|(tag, _)| {
            needle
                .as_deref()
                .map_or(true, |n| tag.to_lowercase().contains(n))
        })
        .map(|(tag, ids)| (tag, ids.len()))
        .collect();
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let tags = counted.into_iter().map(|(tag, _)| tag.clone());
    Ok(match limit {
        Some(n) => tags.take(n).collect(),
        None => tags.collect(),
    })
}

/// Known tags matching one input phrase.
#[derive(Debug, Clone, Serialize)]
pub struct TagSuggestion {
    pub phrase: String,
    pub tags: Vec<String>,
}

pub const DEFAULT_SUGGESTIONS: usize = 5;
pub const MAX_SUGGESTIONS: usize = 10;

/// For each phrase, the known tags containing its tagified form.
pub fn suggest_tags(
    index: &IndexManager,
    phrases: &[String],
    namespaces: &[String],
    limit_per_phrase: Option<usize>,
) -> Result<Vec<TagSuggestion>> {
    let limit = limit_per_phrase
        .unwrap_or(DEFAULT_SUGGESTIONS)
        .clamp(1, MAX_SUGGESTIONS);
    let known = search_tags(index, None, None)?;

    Ok(phrases
        .iter()
        .map(|phrase| {
            let needle = tagify(phrase);
            let tags = known
                .iter()
                .filter(|tag| tag.contains(&needle))
                .filter(|tag| namespaces.is_empty() || namespaces.iter().any(|ns| tag.starts_with(ns.as_str())))
                .take(limit)
                .cloned()
                .collect();
            TagSuggestion {
                phrase: phrase.clone(),
                tags,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, Fixed};

    #[test]
    fn test_cursor_round_trip_and_garbage() {
        assert_eq!(decode_cursor(Some(&encode_cursor(37))), 37);
        assert_eq!(encode_cursor(10), "MTA=");
        assert_eq!(decode_cursor(Some("!!not base64")), 0);
        assert_eq!(decode_cursor(None), 0);
    }

    #[test]
    fn test_paginate_last_page_has_no_cursor() {
        let (page, next) = paginate(vec![1, 2, 3], None, 2);
        assert_eq!(page, vec![1, 2]);
        let (page, next) = paginate(vec![1, 2, 3], next.as_deref(), 2);
        assert_eq!(page, vec![3]);
        assert!(next.is_none());
    }

    #[test]
    fn test_fence_language_reused_across_calls() {
        assert_eq!(fence_language("x\n```rust\nfn a() {}\n```").unwrap().as_deref(), Some("rust"));
        assert_eq!(fence_language("```\nplain\n```").unwrap(), None);
        assert_eq!(fence_language("```c++\n```").unwrap().as_deref(), Some("c++"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("simple".parse::<SearchMode>().unwrap(), SearchMode::Simple);
        assert!("keyword".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_candidates_set_algebra() {
        let (_tmp, store) = fixture();
        let index = store.index();

        let all = candidate_ids(index, &Filters::default()).unwrap();
        assert_eq!(all.len(), index.ids().unwrap().len());

        let rules = candidate_ids(
            index,
            &Filters {
                require_tags: vec!["ruleset".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!rules.is_empty());
        for id in &rules {
            assert!(index.ids().unwrap().get(id).unwrap().tags.contains(&"ruleset".to_string()));
        }

        let not_rules = candidate_ids(
            index,
            &Filters {
                exclude_tags: vec!["ruleset".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rules.len() + not_rules.len(), all.len());
        assert!(rules.is_disjoint(&not_rules));

        let none = candidate_ids(
            index,
            &Filters {
                require_tags: vec!["ruleset".into(), "no such tag".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(none.is_empty());

        let topic = candidate_ids(
            index,
            &Filters {
                topics: vec!["notes".into()],
                ..Default::default()
            },
        )
        .unwrap();
        assert!(topic.iter().all(|id| id.starts_with("notes:")));
    }

    #[tokio::test]
    async fn test_simple_search_is_lexical_only() {
        let (_tmp, store) = fixture();
        let options = SearchOptions {
            mode: SearchMode::Simple,
            ..Default::default()
        };
        // Fixed panics if called, so a simple search must not embed
        let page = search(&store, &Fixed::unused(), "coding standards", &options)
            .await
            .unwrap();
        let top = &page.hits[0];
        assert_eq!(top.id, "coding:coding/standards.md#1");
        assert!(top.snippet.to_lowercase().contains("coding standards"));
        // body and heading match
        assert_eq!(top.score, 0.75);
    }

    #[tokio::test]
    async fn test_require_ruleset_returns_only_rules() {
        let (_tmp, store) = fixture();
        let options = SearchOptions {
            mode: SearchMode::Hybrid,
            filters: Filters {
                require_tags: vec!["ruleset".into()],
                ..Default::default()
            },
            limit: 50,
            ..Default::default()
        };
        let page = search(&store, &Fixed::new(), "anything", &options).await.unwrap();
        assert!(!page.hits.is_empty());
        assert!(page.hits.iter().all(|h| h.tags.contains(&"ruleset".to_string())));
        assert!(page.hits.iter().all(|h| h.corpus == Corpus::Ruleset));
    }

    #[tokio::test]
    async fn test_cursor_walk_covers_everything_once() {
        let (_tmp, store) = fixture();
        let full = search(
            &store,
            &Fixed::new(),
            "the",
            &SearchOptions {
                limit: 50,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(full.next_cursor.is_none());

        let mut walked = Vec::new();
        let mut cursor = None;
        loop {
            let page = search(
                &store,
                &Fixed::new(),
                "the",
                &SearchOptions {
                    limit: 2,
                    cursor: cursor.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            walked.extend(page.hits.into_iter().map(|h| h.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let expected: Vec<_> = full.hits.into_iter().map(|h| h.id).collect();
        assert_eq!(walked, expected);
    }

    #[tokio::test]
    async fn test_hit_language_and_snippet_bias() {
        let (_tmp, store) = fixture();
        let options = SearchOptions {
            mode: SearchMode::Simple,
            snippet_only: true,
            ..Default::default()
        };
        let page = search(&store, &Fixed::unused(), "example", &options).await.unwrap();
        let top = &page.hits[0];
        assert_eq!(top.id, "coding:coding/standards.md#1.3");
        assert_eq!(top.language.as_deref(), Some("rust"));
        // body + heading + code bonus
        assert!((top.score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_documents_desc_reverses_asc() {
        let (_tmp, store) = fixture();
        for sort in [DocumentSort::Title, DocumentSort::Sections, DocumentSort::Topic] {
            let asc = search_documents(
                store.index(),
                &DocumentQuery {
                    sort,
                    ..Default::default()
                },
            )
            .unwrap();
            let desc = search_documents(
                store.index(),
                &DocumentQuery {
                    sort,
                    order: SortOrder::Desc,
                    ..Default::default()
                },
            )
            .unwrap();
            let mut asc: Vec<_> = asc.documents.into_iter().map(|d| d.document).collect();
            let desc: Vec<_> = desc.documents.into_iter().map(|d| d.document).collect();
            asc.reverse();
            assert_eq!(asc, desc);
        }
    }

    #[test]
    fn test_documents_corpus_filter() {
        let (_tmp, store) = fixture();
        let page = search_documents(
            store.index(),
            &DocumentQuery {
                corpus: Some(Corpus::Ruleset),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!page.documents.is_empty());
        assert!(page.documents.iter().all(|d| d.entry.corpus == Corpus::Ruleset));
    }

    #[test]
    fn test_search_tags_by_count() {
        let (_tmp, store) = fixture();
        let tags = search_tags(store.index(), None, None).unwrap();
        let counts: Vec<_> = tags
            .iter()
            .map(|t| store.index().tags().unwrap().postings(t).len())
            .collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(search_tags(store.index(), None, Some(2)).unwrap().len(), 2);
        let filtered = search_tags(store.index(), Some("RULE"), None).unwrap();
        assert_eq!(filtered, vec!["ruleset".to_string()]);
    }

    #[test]
    fn test_suggest_tags_tagifies_and_filters() {
        let (_tmp, store) = fixture();
        let out = suggest_tags(store.index(), &["Coding_Standards".into()], &[], None).unwrap();
        assert_eq!(out[0].tags, vec!["coding standards".to_string()]);

        let ns = suggest_tags(store.index(), &["s".into()], &["rule".into()], Some(99)).unwrap();
        assert!(ns[0].tags.iter().all(|t| t.starts_with("rule")));
    }
}
