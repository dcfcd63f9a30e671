//! Ingestion pipeline orchestration.
//!
//! For each configured input group: discover Markdown files → split front
//! matter → chunk → embed in batches. Then, per group: purge the topic →
//! append records and index them. Finally save all indexes.
//!
//! Every topic is chunked and embedded before any topic is purged, so a
//! provider failure aborts the run with all previous records in place.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use context_pack_core::chunk::Chunker;
use context_pack_core::embedding::Embedder;
use context_pack_core::models::{ChunkDraft, FrontMatter};
use context_pack_core::store::JsonlStore;

use crate::config::{Config, InputConfig};

/// One Markdown file ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the config directory, `/`-separated.
    pub path: String,
    pub data: FrontMatter,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub topics: Vec<String>,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub dry_run: bool,
}

impl IngestSummary {
    pub fn print(&self) {
        if self.dry_run {
            println!("ingest (dry-run)");
        } else {
            println!("ingest");
        }
        println!("  topics: {}", self.topics.join(", "));
        println!("  documents: {}", self.documents);
        println!("  chunks: {}", self.chunks);
        if !self.dry_run {
            println!("  embedded: {}", self.embedded);
        }
        println!("ok");
    }
}

pub async fn run_ingest(
    config: &Config,
    store: &mut JsonlStore,
    embedder: &dyn Embedder,
    topic: Option<&str>,
    dry_run: bool,
) -> Result<IngestSummary> {
    let inputs: Vec<&InputConfig> = match topic {
        Some(name) => match config.input(name) {
            Some(input) => vec![input],
            None => bail!("Unknown topic: '{}'. Configured: {}", name, config.topics().join(", ")),
        },
        None => config.inputs.iter().collect(),
    };
    if inputs.is_empty() {
        bail!("No [[inputs]] configured");
    }

    let chunker = Chunker::new()?;
    let embed = config.embedding.is_enabled();
    if !embed && !dry_run {
        tracing::warn!("embedding provider disabled; chunks are stored without vectors and will not appear in search");
    }

    let mut summary = IngestSummary {
        dry_run,
        ..Default::default()
    };

    // Chunk and embed every topic first; nothing on disk changes until all succeed.
    let mut prepared: Vec<(&InputConfig, Vec<ChunkDraft>, Vec<Vec<f32>>)> = Vec::new();
    for input in inputs {
        let documents = discover(config, input)?;
        let mut drafts: Vec<ChunkDraft> = Vec::new();
        for doc in &documents {
            drafts.extend(chunker.chunk(&input.topic, &doc.path, &doc.body, &doc.data));
        }
        tracing::info!(
            topic = %input.topic,
            documents = documents.len(),
            chunks = drafts.len(),
            "chunked topic"
        );

        summary.topics.push(input.topic.clone());
        summary.documents += documents.len();
        summary.chunks += drafts.len();
        if dry_run {
            continue;
        }

        let vectors = if embed {
            embed_batches(embedder, &drafts, config.ingest.batch_size)
                .await
                .with_context(|| format!("Failed to embed topic '{}'", input.topic))?
        } else {
            vec![Vec::new(); drafts.len()]
        };
        prepared.push((input, drafts, vectors));
    }

    if dry_run {
        return Ok(summary);
    }

    for (input, drafts, vectors) in prepared {
        let purged = store.reset_topic(&input.topic)?;
        tracing::debug!(topic = %input.topic, purged, "purged previous records");

        for (draft, vector) in drafts.into_iter().zip(vectors) {
            if !vector.is_empty() {
                summary.embedded += 1;
            }
            store.add(&draft.into_chunk(input.rank, vector))?;
        }
    }

    store.index().save_all()?;
    tracing::info!(root = %store.root().display(), "indexes saved");
    Ok(summary)
}

/// Embed draft texts `batch_size` at a time, in draft order.
async fn embed_batches(
    embedder: &dyn Embedder,
    drafts: &[ChunkDraft],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(drafts.len());
    for (n, batch) in drafts.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding batch {} failed", n + 1))?;
        if embedded.len() != texts.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            );
        }
        tracing::debug!(batch = n + 1, size = texts.len(), model = embedder.model_name(), "embedded batch");
        vectors.extend(embedded);
    }
    Ok(vectors)
}

/// Markdown files matched by an input group, sorted by path.
pub fn discover(config: &Config, input: &InputConfig) -> Result<Vec<SourceDocument>> {
    let root = &config.base_dir;
    let include_set = build_globset(&input.paths)?;
    let exclude_set = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut documents = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let relative = relative_path(root, path);
        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (data, body) = split_front_matter(&raw);
        documents.push(SourceDocument {
            path: relative,
            data,
            body,
        });
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Split a leading `---` YAML block off a document.
///
/// Returns the parsed mapping and the remaining body. A missing, unclosed,
/// unparsable or non-mapping block leaves the whole input as body.
pub fn split_front_matter(input: &str) -> (FrontMatter, String) {
    let mut lines = input.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return (FrontMatter::new(), input.to_string());
    }

    let mut yaml = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        yaml.push(line);
    }
    if !closed {
        return (FrontMatter::new(), input.to_string());
    }

    let parsed = serde_yaml::from_str::<serde_yaml::Value>(&yaml.join("\n"))
        .ok()
        .and_then(|v| serde_json::to_value(v).ok());
    match parsed {
        Some(serde_json::Value::Object(map)) => (map, lines.collect::<Vec<_>>().join("\n")),
        Some(serde_json::Value::Null) => (FrontMatter::new(), lines.collect::<Vec<_>>().join("\n")),
        _ => {
            tracing::debug!("invalid front matter treated as body");
            (FrontMatter::new(), input.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::embedding::HashProvider;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(docs.join("sub")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".hidden")).unwrap();
        std::fs::write(
            docs.join("guide.md"),
            "---\nowner: docs\n---\n# Intro\nHello.\n\n# Rules\nYou MUST test.\n",
        )
        .unwrap();
        std::fs::write(docs.join("sub/notes.md"), "# Notes\nplain\n").unwrap();
        std::fs::write(docs.join("skip.txt"), "# Not markdown\n").unwrap();
        std::fs::write(tmp.path().join(".hidden/x.md"), "# Hidden\nh\n").unwrap();

        let path = tmp.path().join("ctxpack.toml");
        std::fs::write(
            &path,
            "[ingest]\nbatch_size = 1\n[embedding]\nprovider = \"hash\"\ndims = 32\n\
             [[inputs]]\ntopic = \"coding\"\npaths = [\"**/*.md\"]\nrank = 5\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        (tmp, config)
    }

    #[test]
    fn test_front_matter_split() {
        let (data, body) = split_front_matter("---\ntitle: Guide\ntags: [a, b]\n---\n# A\nx");
        assert_eq!(data["title"], "Guide");
        assert_eq!(body, "# A\nx");

        let (data, body) = split_front_matter("---\n: : bad [\n---\nbody");
        assert!(data.is_empty());
        assert!(body.starts_with("---"));

        let (data, body) = split_front_matter("# No front matter\n");
        assert!(data.is_empty());
        assert_eq!(body, "# No front matter\n");
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let (_tmp, config) = workspace();
        let docs = discover(&config, &config.inputs[0]).unwrap();
        let paths: Vec<_> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/guide.md", "docs/sub/notes.md"]);
        assert_eq!(docs[0].data["owner"], "docs");
        assert!(docs[0].body.starts_with("# Intro"));
    }

    #[tokio::test]
    async fn test_ingest_writes_and_reingest_replaces() {
        let (_tmp, config) = workspace();
        let embedder = HashProvider::new(32).unwrap();
        let mut store = crate::storage::open(&config).unwrap();

        let summary = run_ingest(&config, &mut store, &embedder, None, false).await.unwrap();
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.embedded, 3);

        let chunk = store.get("coding:docs/guide.md#2").unwrap().unwrap();
        assert_eq!(chunk.rank, Some(5.0));
        assert_eq!(chunk.data["owner"], "docs");
        assert_eq!(chunk.embedding.len(), 32);

        // a second run starts from scratch rather than appending
        run_ingest(&config, &mut store, &embedder, Some("coding"), false).await.unwrap();
        assert_eq!(store.load(Some("coding")).unwrap().len(), 3);
        assert_eq!(store.index().ids().unwrap().len(), 3);

        // indexes were persisted
        let fresh = crate::storage::open(&config).unwrap();
        assert_eq!(fresh.index().ids().unwrap().len(), 3);
        assert_eq!(fresh.index().embeddings().unwrap().dimensions(), 32);
    }

    /// Hash embeddings, except that any text containing `BOOM` fails the batch.
    struct FailOnMarker(HashProvider);

    #[async_trait::async_trait]
    impl Embedder for FailOnMarker {
        fn model_name(&self) -> &str {
            "fail-on-marker"
        }

        fn dims(&self) -> usize {
            self.0.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("BOOM")) {
                bail!("provider unavailable");
            }
            self.0.embed(texts).await
        }
    }

    #[tokio::test]
    async fn test_failed_later_topic_leaves_earlier_topics_readable() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("b")).unwrap();
        std::fs::write(tmp.path().join("a/x.md"), "# One\nfirst\n\n# Two\nsecond\n").unwrap();
        std::fs::write(tmp.path().join("b/y.md"), "# Only\nquiet\n").unwrap();
        let path = tmp.path().join("ctxpack.toml");
        std::fs::write(
            &path,
            "[embedding]\nprovider = \"hash\"\ndims = 16\n\
             [[inputs]]\ntopic = \"a\"\npaths = [\"a/*.md\"]\n\
             [[inputs]]\ntopic = \"b\"\npaths = [\"b/*.md\"]\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        let embedder = FailOnMarker(HashProvider::new(16).unwrap());
        let mut store = crate::storage::open(&config).unwrap();
        run_ingest(&config, &mut store, &embedder, None, false).await.unwrap();

        // topic a shifts its offsets; topic b now fails to embed
        std::fs::write(
            tmp.path().join("a/x.md"),
            "# Zero\nprepended text\n\n# One\nfirst\n\n# Two\nsecond\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join("b/y.md"), "# Only\nBOOM\n").unwrap();
        let err = run_ingest(&config, &mut store, &embedder, None, false)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("topic 'b'"));

        let fresh = crate::storage::open(&config).unwrap();
        let chunk = fresh.get("a:a/x.md#2").unwrap().unwrap();
        assert!(chunk.text.contains("second"));
        assert!(fresh.get("a:a/x.md#3").unwrap().is_none());
        assert_eq!(fresh.load(Some("a")).unwrap().len(), 2);
        assert!(fresh.get("b:b/y.md#1").unwrap().unwrap().text.contains("quiet"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let (_tmp, config) = workspace();
        let embedder = HashProvider::new(32).unwrap();
        let mut store = crate::storage::open(&config).unwrap();
        let summary = run_ingest(&config, &mut store, &embedder, None, true).await.unwrap();
        assert_eq!(summary.chunks, 3);
        assert!(!store.file_for("coding").exists());
        assert!(run_ingest(&config, &mut store, &embedder, Some("nope"), true).await.is_err());
    }
}
