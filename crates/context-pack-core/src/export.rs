//! Packaging selected sections: JSON/Markdown export, text gathering for
//! summarization, and fenced code extraction.

use anyhow::{bail, Result};
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;

use crate::sections::{document, sections_by_ids, SectionText};
use crate::store::JsonlStore;

pub const DEFAULT_MAX_CHARS: usize = 12_000;
pub const MIN_MAX_CHARS: usize = 500;
pub const MAX_MAX_CHARS: usize = 200_000;

const FENCE_PATTERN: &str = r"```([a-zA-Z0-9+_\-]*)\n((?s:.*?))```";

/// Which sections an export-style operation works on.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextSelection {
    Ids(Vec<String>),
    Document {
        topic: String,
        document: String,
        /// Section ids or `A > B` heading paths; empty means all.
        sections: Vec<String>,
    },
}

impl ContextSelection {
    /// Build from loose arguments; ids win when both forms are given.
    pub fn from_parts(
        ids: Vec<String>,
        topic: Option<String>,
        document: Option<String>,
        sections: Vec<String>,
    ) -> Result<Self> {
        if !ids.is_empty() {
            return Ok(ContextSelection::Ids(ids));
        }
        match (topic, document) {
            (Some(topic), Some(document)) => Ok(ContextSelection::Document {
                topic,
                document,
                sections,
            }),
            _ => bail!("Provide either ids or (topic + document)."),
        }
    }

    /// The selected sections in order; unknown ids or documents yield nothing.
    pub fn resolve(&self, store: &JsonlStore) -> Result<Vec<SectionText>> {
        match self {
            ContextSelection::Ids(ids) => sections_by_ids(store, ids, None),
            ContextSelection::Document {
                topic,
                document: path,
                sections,
            } => Ok(document(store, topic, path, sections)?
                .map(|view| view.sections)
                .unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => bail!("Unknown format: {}. Use json or markdown.", other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExportedSection {
    Full(SectionText),
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Export {
    Json { sections: Vec<ExportedSection> },
    Markdown { content: String },
}

pub fn export(
    store: &JsonlStore,
    selection: &ContextSelection,
    format: ExportFormat,
    include_meta: bool,
) -> Result<Export> {
    let sections = selection.resolve(store)?;
    Ok(match format {
        ExportFormat::Markdown => Export::Markdown {
            content: to_markdown(&sections),
        },
        ExportFormat::Json => Export::Json {
            sections: sections
                .into_iter()
                .map(|s| {
                    if include_meta {
                        ExportedSection::Full(s)
                    } else {
                        ExportedSection::Text { text: s.text }
                    }
                })
                .collect(),
        },
    })
}

/// Render sections as one Markdown document.
///
/// Each section becomes `## A > B`, an HTML comment carrying its id, and
/// its body. Sections without a breadcrumb use the id as heading.
pub fn to_markdown(sections: &[SectionText]) -> String {
    sections
        .iter()
        .map(|s| {
            let heading = if s.section_path.is_empty() {
                s.id.clone()
            } else {
                s.section_path.join(" > ")
            };
            format!("## {}\n<!-- {} -->\n\n{}\n", heading, s.id, s.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove fenced code blocks, collapsing the blank lines they leave.
pub fn strip_fences(text: &str) -> Result<String> {
    let fence = Regex::new(r"(?s)```[^\n]*\n.*?```")?;
    let blank = Regex::new(r"\n{3,}")?;
    let stripped = fence.replace_all(text, "");
    Ok(blank.replace_all(&stripped, "\n\n").trim().to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct GatherOptions {
    pub max_chars: Option<usize>,
    pub strip_code: bool,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            max_chars: None,
            strip_code: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gathered {
    pub gathered: Vec<SectionText>,
    pub total_chars: usize,
}

impl Gathered {
    /// Section texts joined by blank lines.
    pub fn joined(&self) -> String {
        self.gathered
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Collect section texts under a soft character cap.
///
/// The section that crosses the cap is cut at its last paragraph break
/// inside the remaining budget (or hard-cut when there is none) and
/// gathering stops there.
pub fn gather(
    store: &JsonlStore,
    selection: &ContextSelection,
    options: GatherOptions,
) -> Result<Gathered> {
    let max_chars = options
        .max_chars
        .unwrap_or(DEFAULT_MAX_CHARS)
        .clamp(MIN_MAX_CHARS, MAX_MAX_CHARS);

    let mut gathered = Vec::new();
    let mut total = 0;
    for mut section in selection.resolve(store)? {
        let text = if options.strip_code {
            strip_fences(&section.text)?
        } else {
            section.text.clone()
        };
        if text.is_empty() {
            continue;
        }

        let len = text.chars().count();
        if total + len <= max_chars {
            total += len;
            section.text = text;
            gathered.push(section);
            continue;
        }

        let remaining = max_chars - total;
        if remaining == 0 {
            break;
        }
        let slice = take_chars(&text, remaining);
        let cut = match slice.rfind("\n\n") {
            Some(at) if at > 0 => &slice[..at],
            _ => slice,
        };
        if cut.is_empty() {
            break;
        }
        total += cut.chars().count();
        section.text = cut.to_string();
        gathered.push(section);
        break;
    }

    Ok(Gathered {
        gathered,
        total_chars: total,
    })
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlock {
    pub id: String,
    pub language: Option<String>,
    pub code: String,
    pub section_path: Vec<String>,
}

/// Every fenced code block in the selected sections, in order.
pub fn extract_code(store: &JsonlStore, selection: &ContextSelection) -> Result<Vec<CodeBlock>> {
    let fence = Regex::new(FENCE_PATTERN)?;
    let mut blocks = Vec::new();
    for section in selection.resolve(store)? {
        for caps in fence.captures_iter(&section.text) {
            let language = caps
                .get(1)
                .map(|m| m.as_str().trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string);
            blocks.push(CodeBlock {
                id: section.id.clone(),
                language,
                code: caps.get(2).map_or("", |m| m.as_str()).to_string(),
                section_path: section.section_path.clone(),
            });
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;

    fn standards() -> ContextSelection {
        ContextSelection::Document {
            topic: "coding".into(),
            document: "coding/standards.md".into(),
            sections: Vec::new(),
        }
    }

    #[test]
    fn test_selection_requires_ids_or_document() {
        assert!(ContextSelection::from_parts(vec![], Some("coding".into()), None, vec![]).is_err());
        let sel = ContextSelection::from_parts(vec!["a".into()], None, None, vec![]).unwrap();
        assert_eq!(sel, ContextSelection::Ids(vec!["a".into()]));
    }

    #[test]
    fn test_markdown_export() {
        let (_tmp, store) = fixture();
        let out = export(
            &store,
            &ContextSelection::Ids(vec!["coding:coding/standards.md#1.1".into()]),
            ExportFormat::Markdown,
            true,
        )
        .unwrap();
        match out {
            Export::Markdown { content } => {
                assert!(content.starts_with("## Coding Standards > Naming\n"));
                assert!(content.contains("<!-- coding:coding/standards.md#1.1 -->"));
                assert!(content.contains("snake_case"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_json_export_without_meta() {
        let (_tmp, store) = fixture();
        let out = export(&store, &standards(), ExportFormat::Json, false).unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["format"], "json");
        let sections = json["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 4);
        assert!(sections[0].get("id").is_none());
        assert!(sections[0]["text"].is_string());
    }

    #[test]
    fn test_strip_fences() {
        let text = "Before.\n\n```rust\nfn main() {}\n```\n\nAfter.";
        assert_eq!(strip_fences(text).unwrap(), "Before.\n\nAfter.");
    }

    #[test]
    fn test_gather_strips_code_and_counts() {
        let (_tmp, store) = fixture();
        let out = gather(&store, &standards(), GatherOptions::default()).unwrap();
        assert_eq!(out.gathered.len(), 4);
        assert!(out.gathered.iter().all(|s| !s.text.contains("```")));
        let total: usize = out.gathered.iter().map(|s| s.text.chars().count()).sum();
        assert_eq!(out.total_chars, total);
    }

    #[test]
    fn test_gather_truncates_at_paragraph() {
        let (_tmp, mut store) = crate::test_support::empty_store();
        let long = format!("{}\n\n{}", "a".repeat(400), "b".repeat(400));
        store
            .add(&crate::test_support::chunk("t:d.md#1", &long, None, vec![1.0]))
            .unwrap();
        let out = gather(
            &store,
            &ContextSelection::Ids(vec!["t:d.md#1".into()]),
            GatherOptions {
                max_chars: Some(10),
                strip_code: true,
            },
        )
        .unwrap();
        // clamped up to 500; the cut lands on the paragraph break
        assert_eq!(out.gathered[0].text, "a".repeat(400));
        assert_eq!(out.total_chars, 400);
    }

    #[test]
    fn test_gather_stops_when_budget_is_spent() {
        let (_tmp, mut store) = crate::test_support::empty_store();
        store
            .add(&crate::test_support::chunk("t:d.md#1", &"a".repeat(500), None, vec![1.0]))
            .unwrap();
        store
            .add(&crate::test_support::chunk("t:d.md#2", "more", None, vec![1.0]))
            .unwrap();
        let out = gather(
            &store,
            &ContextSelection::Ids(vec!["t:d.md#1".into(), "t:d.md#2".into()]),
            GatherOptions {
                max_chars: Some(500),
                strip_code: true,
            },
        )
        .unwrap();
        assert_eq!(out.gathered.len(), 1);
        assert_eq!(out.total_chars, 500);
    }

    #[test]
    fn test_extract_code() {
        let (_tmp, store) = fixture();
        let blocks = extract_code(&store, &standards()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "coding:coding/standards.md#1.3");
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));
        assert_eq!(blocks[0].code, "fn main() {}\n");
        assert_eq!(blocks[0].section_path, vec!["Coding Standards", "Example"]);
    }
}
