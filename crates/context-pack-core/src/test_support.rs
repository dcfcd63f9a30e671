//! Shared fixtures for unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::chunk::Chunker;
use crate::embedding::Embedder;
use crate::models::{Chunk, FrontMatter, RuleLevel};
use crate::store::JsonlStore;

pub const STANDARDS: &str = "\
# Coding Standards

These are the coding standards for the team.

## Naming

Functions MUST use snake_case names.

## Errors

Code SHOULD propagate errors with context.

## Example

An example of the style:

```rust
fn main() {}
```
";

pub const IDEAS: &str = "\
# Ideas

Loose thoughts about the project.

# Backlog

Things the team might do later.
";

/// Deterministic embedder derived from text length.
pub struct Fixed {
    fail: bool,
}

impl Fixed {
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// An embedder that errors when called.
    pub fn unused() -> Self {
        Self { fail: true }
    }
}

pub fn vector_for(text: &str) -> Vec<f32> {
    let n = text.len() as f32;
    vec![n, 1.0, (text.len() % 7) as f32]
}

#[async_trait]
impl Embedder for Fixed {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            bail!("embedder should not be called");
        }
        Ok(texts.iter().map(|t| vector_for(t)).collect())
    }
}

/// Store with `coding` (rank 10) and `notes` topics ingested.
pub fn fixture() -> (TempDir, JsonlStore) {
    let tmp = TempDir::new().unwrap();
    let mut store = JsonlStore::open(
        tmp.path().join("db"),
        vec!["coding".into(), "notes".into()],
    )
    .unwrap();
    let chunker = Chunker::new().unwrap();
    let docs = [
        ("coding", "coding/standards.md", STANDARDS, Some(10.0)),
        ("notes", "notes/ideas.md", IDEAS, None),
    ];
    for (topic, path, body, rank) in docs {
        for draft in chunker.chunk(topic, path, body, &FrontMatter::new()) {
            let embedding = vector_for(&draft.text);
            store.add(&draft.into_chunk(rank, embedding)).unwrap();
        }
    }
    (tmp, store)
}

/// Hand-built chunk with an explicit vector.
pub fn chunk(id: &str, text: &str, rank: Option<f64>, embedding: Vec<f32>) -> Chunk {
    let (topic, rest) = id.split_once(':').unwrap();
    let (path, section) = rest.split_once('#').unwrap();
    Chunk {
        id: id.into(),
        topic: topic.into(),
        path: path.into(),
        section: section.into(),
        headings: vec![format!("Section {}", section)],
        rule: text.contains("MUST").then_some(RuleLevel::Must),
        text: text.into(),
        tags: vec![topic.into(), format!("s{}", section)],
        data: FrontMatter::new(),
        rank,
        embedding,
    }
}

/// Empty store under a temp dir with topic `t`.
pub fn empty_store() -> (TempDir, JsonlStore) {
    let tmp = TempDir::new().unwrap();
    let store = JsonlStore::open(tmp.path().join("db"), vec!["t".into()]).unwrap();
    (tmp, store)
}
