//! Rule-driven operations: checklists and draft enforcement.

use anyhow::{bail, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::embedding::Embedder;
use crate::models::{Corpus, RuleLevel, RULESET_TAG};
use crate::search::{search, Filters, SearchMode, SearchOptions};
use crate::store::JsonlStore;

pub const DEFAULT_CHECKLIST_LIMIT: usize = 20;
pub const DEFAULT_ENFORCE_LIMIT: usize = 15;
/// Longest draft echoed back by [`enforce_rules`], in characters.
pub const MAX_DRAFT_ECHO: usize = 4000;

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    pub section_path: Vec<String>,
}

/// Checklist items grouped by rule level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Checklist {
    #[serde(rename = "MUST")]
    pub must: Vec<ChecklistItem>,
    #[serde(rename = "SHOULD")]
    pub should: Vec<ChecklistItem>,
    #[serde(rename = "MUST NOT")]
    pub must_not: Vec<ChecklistItem>,
    #[serde(rename = "UNKNOWN")]
    pub unknown: Vec<ChecklistItem>,
}

impl Checklist {
    fn push(&mut self, level: Option<RuleLevel>, item: ChecklistItem) {
        match level {
            Some(RuleLevel::Must) => self.must.push(item),
            Some(RuleLevel::Should) => self.should.push(item),
            Some(RuleLevel::MustNot) => self.must_not.push(item),
            None => self.unknown.push(item),
        }
    }

    pub fn len(&self) -> usize {
        self.must.len() + self.should.len() + self.must_not.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `## LEVEL` groups of `- [ ] (id) title` lines; empty groups omitted.
    pub fn to_markdown(&self) -> String {
        let groups = [
            ("MUST", &self.must),
            ("SHOULD", &self.should),
            ("MUST NOT", &self.must_not),
            ("UNKNOWN", &self.unknown),
        ];
        let mut lines = Vec::new();
        for (name, items) in groups {
            if items.is_empty() {
                continue;
            }
            lines.push(format!("## {}", name));
            for item in items.iter() {
                lines.push(format!("- [ ] ({}) {}", item.id, item.title));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecklistFormat {
    #[default]
    Json,
    Markdown,
}

impl FromStr for ChecklistFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ChecklistFormat::Json),
            "markdown" | "md" => Ok(ChecklistFormat::Markdown),
            other => bail!("Unknown format: {}. Use json or markdown.", other),
        }
    }
}

/// Title for a checklist line: the last heading, else the first text line.
pub fn item_title(headings: &[String], text: &str) -> String {
    headings
        .last()
        .cloned()
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Search for rules relevant to `task` and group them into a checklist.
///
/// `require_tags` defaults to the ruleset tag when the caller sets none.
pub async fn checklist(
    store: &JsonlStore,
    embedder: &dyn Embedder,
    task: &str,
    filters: &Filters,
    mode: SearchMode,
    limit: Option<usize>,
) -> Result<Checklist> {
    let mut filters = filters.clone();
    if filters.require_tags.is_empty() {
        filters.require_tags = vec![RULESET_TAG.to_string()];
    }
    let options = SearchOptions {
        filters,
        mode,
        limit: limit.unwrap_or(DEFAULT_CHECKLIST_LIMIT),
        ..Default::default()
    };
    let page = search(store, embedder, task, &options).await?;

    let mut checklist = Checklist::default();
    for hit in page.hits {
        let Some(chunk) = store.get(&hit.id)? else {
            continue;
        };
        checklist.push(
            chunk.rule,
            ChecklistItem {
                title: item_title(&chunk.headings, &chunk.text),
                id: hit.id,
                section_path: chunk.headings,
            },
        );
    }
    Ok(checklist)
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedRule {
    pub id: String,
    pub rule: Option<RuleLevel>,
    pub topic: String,
    pub document: String,
    pub section_path: Vec<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enforcement {
    pub draft: String,
    pub rules: Vec<AppliedRule>,
}

/// Rules relevant to a draft, for review.
pub async fn enforce_rules(
    store: &JsonlStore,
    embedder: &dyn Embedder,
    draft: &str,
    filters: &Filters,
    mode: SearchMode,
    limit: Option<usize>,
) -> Result<Enforcement> {
    let options = SearchOptions {
        filters: filters.clone(),
        mode,
        limit: limit.unwrap_or(DEFAULT_ENFORCE_LIMIT),
        ..Default::default()
    };
    let page = search(store, embedder, draft, &options).await?;

    let mut rules = Vec::new();
    for hit in page.hits.into_iter().filter(|h| h.corpus == Corpus::Ruleset) {
        let rule = store.get(&hit.id)?.and_then(|c| c.rule);
        rules.push(AppliedRule {
            id: hit.id,
            rule,
            topic: hit.topic,
            document: hit.document,
            section_path: hit.section_path,
            snippet: hit.snippet,
        });
    }

    Ok(Enforcement {
        draft: draft.chars().take(MAX_DRAFT_ECHO).collect(),
        rules,
    })
}
