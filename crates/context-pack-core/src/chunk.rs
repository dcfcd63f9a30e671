//! Markdown section chunker.
//!
//! Splits one Markdown document into ordered [`ChunkDraft`]s, one per
//! heading-delimited section, numbering sections hierarchically.
//!
//! # Numbering
//!
//! A counter array tracks the current heading depth. On each heading:
//!
//! | Heading level vs. depth | Counter update |
//! |-------------------------|----------------|
//! | deeper | push `1` (one level, whatever the jump) |
//! | same | increment last |
//! | shallower | truncate to level, increment last |
//!
//! The joined counters (`"1.2.1"`) form the section number and the id
//! suffix. Text before the first heading gets suffixes `100`, `101`, …
//! and an empty section number.
//!
//! Headings inside fenced code blocks (three or more backticks, closed by
//! a bare fence at least as long) are body text, not structure.

use anyhow::Result;
use regex::Regex;

use crate::models::{ChunkDraft, FrontMatter, RuleLevel, KNOWLEDGE_TAG, RULESET_TAG};

/// First id suffix used for text before the first heading.
pub const PREAMBLE_ID_START: usize = 100;

/// Compiled patterns for splitting Markdown into sections.
#[derive(Debug, Clone)]
pub struct Chunker {
    heading: Regex,
    numbering: Regex,
    rules: Regex,
}

impl Chunker {
    pub fn new() -> Result<Self> {
        Ok(Self {
            heading: Regex::new(r"^(#{1,6})\s+(.*)$")?,
            numbering: Regex::new(r"^([0-9]+\.)+\s+")?,
            rules: Regex::new(r"\b(MUST NOT|MUST|SHOULD)\b")?,
        })
    }

    /// First rule keyword found in `text`, if any.
    pub fn rule_level(&self, text: &str) -> Option<RuleLevel> {
        self.rules
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| RuleLevel::from_keyword(m.as_str()))
    }

    /// Chunk one document body. Front matter must already be split off.
    pub fn chunk(
        &self,
        topic: &str,
        path: &str,
        body: &str,
        data: &FrontMatter,
    ) -> Vec<ChunkDraft> {
        let mut builder = SectionBuilder::new(self, topic, path, data);
        let mut fence: Option<usize> = None;

        for line in body.lines() {
            if let Some(len) = fence_marker(line) {
                fence = match fence {
                    None => Some(len),
                    Some(open) if len >= open && is_bare_fence(line) => None,
                    still_open => still_open,
                };
                builder.buffer.push(line);
                continue;
            }

            if fence.is_none() {
                if let Some(caps) = self.heading.captures(line) {
                    let level = caps.get(1).map(|m| m.as_str().len()).unwrap_or(1);
                    let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                    let title = self.numbering.replace(raw, "").trim().to_string();
                    builder.flush();
                    builder.enter_heading(level, title);
                    continue;
                }
            }

            builder.buffer.push(line);
        }

        builder.flush();
        builder.drafts
    }
}

/// Mutable state of one chunking pass.
struct SectionBuilder<'a> {
    chunker: &'a Chunker,
    topic: &'a str,
    path: &'a str,
    data: &'a FrontMatter,
    base_tags: Vec<String>,
    buffer: Vec<&'a str>,
    headings: Vec<String>,
    counters: Vec<usize>,
    next_preamble: usize,
    drafts: Vec<ChunkDraft>,
}

impl<'a> SectionBuilder<'a> {
    fn new(chunker: &'a Chunker, topic: &'a str, path: &'a str, data: &'a FrontMatter) -> Self {
        let mut base_tags = vec![topic.to_string()];
        for segment in path.split('/') {
            push_unique(&mut base_tags, tagify(segment));
        }
        Self {
            chunker,
            topic,
            path,
            data,
            base_tags,
            buffer: Vec::new(),
            headings: Vec::new(),
            counters: Vec::new(),
            next_preamble: PREAMBLE_ID_START,
            drafts: Vec::new(),
        }
    }

    fn enter_heading(&mut self, level: usize, title: String) {
        let depth = self.counters.len();
        if level > depth {
            self.counters.push(1);
        } else {
            self.counters.truncate(level);
            if let Some(last) = self.counters.last_mut() {
                *last += 1;
            }
        }
        // breadcrumb length always equals the counter depth
        self.headings.truncate(self.counters.len() - 1);
        self.headings.push(title);
    }

    fn flush(&mut self) {
        let text = self.buffer.join("\n").trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return;
        }

        let rule = self.chunker.rule_level(&text);
        let section = self
            .counters
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".");
        let suffix = if self.counters.is_empty() {
            let n = self.next_preamble;
            self.next_preamble += 1;
            n.to_string()
        } else {
            section.clone()
        };

        let mut tags = self.base_tags.clone();
        let corpus_tag = if rule.is_some() { RULESET_TAG } else { KNOWLEDGE_TAG };
        push_unique(&mut tags, corpus_tag.to_string());
        for heading in &self.headings {
            push_unique(&mut tags, tagify(heading));
        }

        self.drafts.push(ChunkDraft {
            id: format!("{}:{}#{}", self.topic, self.path, suffix),
            topic: self.topic.to_string(),
            path: self.path.to_string(),
            section,
            headings: self.headings.clone(),
            rule,
            text,
            tags,
            data: self.data.clone(),
        });
    }
}

fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tag.is_empty() && !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// Backtick count if the line opens or closes a code fence.
fn fence_marker(line: &str) -> Option<usize> {
    let n = line
        .trim_start()
        .chars()
        .take_while(|&c| c == '`')
        .count();
    (n >= 3).then_some(n)
}

fn is_bare_fence(line: &str) -> bool {
    line.trim().trim_start_matches('`').is_empty()
}

/// Normalize a phrase into tag form.
///
/// Strips a trailing `.md`, turns `-`, `_` and punctuation into spaces,
/// collapses whitespace, lowercases and trims.
///
/// ```rust
/// use context_pack_core::chunk::tagify;
///
/// assert_eq!(tagify("Coding-Standards.md"), "coding standards");
/// assert_eq!(tagify("  API   (v2)_notes "), "api v2 notes");
/// ```
pub fn tagify(phrase: &str) -> String {
    let phrase = phrase.strip_suffix(".md").unwrap_or(phrase);
    let spaced: String = phrase
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
