//! Core data models for context packs.
//!
//! These types flow through the whole pipeline:
//!
//! ```text
//! Markdown ──▶ ChunkDraft ──▶ Chunk (rank + embedding) ──▶ <topic>.jsonl
//!                                        │
//!                                        ├──▶ IdEntry       (index/ids.json)
//!                                        ├──▶ DocumentEntry (index/documents.json)
//!                                        ├──▶ tag postings  (index/tags.json)
//!                                        └──▶ vector row    (index/embeddings.*)
//! ```
//!
//! Field names are the on-disk names; renaming one changes the file format.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Front-matter metadata carried by every chunk of a document.
pub type FrontMatter = serde_json::Map<String, serde_json::Value>;

/// Tag applied to chunks containing normative rule language.
pub const RULESET_TAG: &str = "ruleset";
/// Tag applied to every other chunk.
pub const KNOWLEDGE_TAG: &str = "knowledge base";

/// Normative rule level detected in a chunk's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleLevel {
    #[serde(rename = "MUST")]
    Must,
    #[serde(rename = "SHOULD")]
    Should,
    #[serde(rename = "MUST NOT")]
    MustNot,
}

impl RuleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleLevel::Must => "MUST",
            RuleLevel::Should => "SHOULD",
            RuleLevel::MustNot => "MUST NOT",
        }
    }

    /// Parse a rule keyword as it appears in body text.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "MUST" => Some(RuleLevel::Must),
            "SHOULD" => Some(RuleLevel::Should),
            "MUST NOT" => Some(RuleLevel::MustNot),
            _ => None,
        }
    }
}

impl fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document/chunk classification derived from the ruleset tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    Ruleset,
    Knowledge,
}

impl Corpus {
    /// `Ruleset` if the tag list carries [`RULESET_TAG`], else `Knowledge`.
    pub fn from_tags(tags: &[String]) -> Self {
        if tags.iter().any(|t| t == RULESET_TAG) {
            Corpus::Ruleset
        } else {
            Corpus::Knowledge
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Ruleset => "ruleset",
            Corpus::Knowledge => "knowledge",
        }
    }
}

impl std::str::FromStr for Corpus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ruleset" => Ok(Corpus::Ruleset),
            "knowledge" => Ok(Corpus::Knowledge),
            other => anyhow::bail!("Unknown corpus: {}. Use ruleset or knowledge.", other),
        }
    }
}

/// A chunk as produced by the chunker, before ranking and embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// `topic:path#section`, or `topic:path#<n>` for text before the first heading.
    pub id: String,
    pub topic: String,
    /// Document path relative to the ingestion root, `/`-separated.
    pub path: String,
    /// Dot-joined section number (`"1.2.3"`); empty before the first heading.
    pub section: String,
    /// Heading breadcrumb from the top level down to this section.
    pub headings: Vec<String>,
    pub rule: Option<RuleLevel>,
    /// Trimmed body text.
    pub text: String,
    pub tags: Vec<String>,
    pub data: FrontMatter,
}

impl ChunkDraft {
    /// Attach the group rank and the embedding vector.
    pub fn into_chunk(self, rank: Option<f64>, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            topic: self.topic,
            path: self.path,
            section: self.section,
            headings: self.headings,
            rule: self.rule,
            text: self.text,
            tags: self.tags,
            data: self.data,
            rank,
            embedding,
        }
    }
}

/// One stored record: a line of `<topic>.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub topic: String,
    pub path: String,
    pub section: String,
    pub headings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleLevel>,
    pub text: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: FrontMatter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<f64>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Key of the owning document in the document index.
    pub fn document_key(&self) -> String {
        document_key(&self.topic, &self.path)
    }

    pub fn corpus(&self) -> Corpus {
        Corpus::from_tags(&self.tags)
    }
}

/// Locates exactly one line of a topic's record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePointer {
    /// Record file name, relative to the storage root.
    pub file: String,
    /// Byte offset of the line.
    pub offset: u64,
    /// Byte length of the line including its trailing newline.
    pub length: u64,
}

/// Denormalized chunk metadata plus its store pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdEntry {
    pub database: String,
    pub offset: u64,
    pub length: u64,
    pub topic: String,
    pub document: String,
    pub section: String,
    pub headings: Vec<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<f64>,
    pub corpus: Corpus,
}

impl IdEntry {
    pub fn pointer(&self) -> StorePointer {
        StorePointer {
            file: self.database.clone(),
            offset: self.offset,
            length: self.length,
        }
    }

    pub fn document_key(&self) -> String {
        document_key(&self.topic, &self.document)
    }
}

/// One row of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub id: String,
    /// Heading breadcrumb of the section.
    pub section_path: Vec<String>,
    /// Hierarchical section number, the TOC sort key.
    #[serde(default)]
    pub section: String,
}

/// Per-document aggregate kept by the document index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub topic: String,
    pub tags: Vec<String>,
    pub corpus: Corpus,
    pub sections: Vec<TocEntry>,
}

impl DocumentEntry {
    /// Position of a section id within the TOC.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }
}

/// `topic:path`, the document index key.
pub fn document_key(topic: &str, path: &str) -> String {
    format!("{}:{}", topic, path)
}

/// Compare strings treating runs of ASCII digits as numbers.
///
/// `"1.2" < "1.10"`, `"2" < "10"`, and non-digit runs compare
/// case-insensitively with a byte-wise tie-break.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Segments::new(a);
    let mut right = Segments::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_segment(x: &str, y: &str) -> Ordering {
    let x_digits = x.bytes().all(|b| b.is_ascii_digit());
    let y_digits = y.bytes().all(|b| b.is_ascii_digit());
    match (x_digits, y_digits) {
        (true, true) => {
            let xs = x.trim_start_matches('0');
            let ys = y.trim_start_matches('0');
            xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys))
        }
        // digits sort before text, as in locale collation
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}

/// Splits a string into alternating digit / non-digit runs.
struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}
