//! The four persistent indexes and the [`IndexManager`] that owns them.
//!
//! | Index | File(s) under `<root>/index/` | Maps |
//! |-------|-------------------------------|------|
//! | [`IdIndex`] | `ids.json` | chunk id → [`IdEntry`](crate::models::IdEntry) |
//! | [`DocumentIndex`] | `documents.json` | `topic:path` → [`DocumentEntry`](crate::models::DocumentEntry) |
//! | [`TagIndex`] | `tags.json` | tag → postings list of chunk ids |
//! | [`EmbeddingIndex`] | `embeddings.json` + `embeddings.bin` | chunk id → row of a packed f32 table |
//!
//! Every index is mutated in memory during ingestion and written with
//! [`Persist::save`]. [`Persist::load`] treats a missing file as an empty
//! index. Writes are plain overwrites with no atomic rename.

mod documents;
mod embeddings;
mod ids;
mod tags;

pub use documents::DocumentIndex;
pub use embeddings::{EmbeddingHeader, EmbeddingIndex};
pub use ids::IdIndex;
pub use tags::{TagIndex, TAG_STOPLIST};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Directory holding the index files, relative to the storage root.
pub const INDEX_DIR: &str = "index";

/// Load/save capability shared by the four index types.
pub trait Persist: Sized {
    /// Rebuild the index from `<root>/index/`. Missing files yield an empty index.
    fn load(root: &Path) -> Result<Self>;
    /// Write the index under `<root>/index/`, creating the directory if needed.
    fn save(&self, root: &Path) -> Result<()>;
}

pub fn index_dir(root: &Path) -> PathBuf {
    root.join(INDEX_DIR)
}

/// Read a JSON file, or `T::default()` when it does not exist.
pub(crate) fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Owns the four indexes of one storage root.
///
/// Each index is loaded from disk on first access and cached for the
/// lifetime of the manager. There is no refresh: after another process
/// re-ingests, call [`IndexManager::invalidate`] or build a new manager.
#[derive(Debug)]
pub struct IndexManager {
    root: PathBuf,
    ids: OnceLock<IdIndex>,
    documents: OnceLock<DocumentIndex>,
    tags: OnceLock<TagIndex>,
    embeddings: OnceLock<EmbeddingIndex>,
}

fn ensure<'a, T: Persist>(cell: &'a OnceLock<T>, root: &Path) -> Result<&'a T> {
    if let Some(index) = cell.get() {
        return Ok(index);
    }
    let loaded = T::load(root)?;
    Ok(cell.get_or_init(|| loaded))
}

fn ensure_mut<'a, T: Persist>(cell: &'a mut OnceLock<T>, root: &Path) -> Result<&'a mut T> {
    if cell.get().is_none() {
        let loaded = T::load(root)?;
        let _ = cell.set(loaded);
    }
    cell.get_mut()
        .ok_or_else(|| anyhow!("index under {} failed to initialize", root.display()))
}

impl IndexManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ids: OnceLock::new(),
            documents: OnceLock::new(),
            tags: OnceLock::new(),
            embeddings: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ids(&self) -> Result<&IdIndex> {
        ensure(&self.ids, &self.root)
    }

    pub fn documents(&self) -> Result<&DocumentIndex> {
        ensure(&self.documents, &self.root)
    }

    pub fn tags(&self) -> Result<&TagIndex> {
        ensure(&self.tags, &self.root)
    }

    pub fn embeddings(&self) -> Result<&EmbeddingIndex> {
        ensure(&self.embeddings, &self.root)
    }

    pub fn ids_mut(&mut self) -> Result<&mut IdIndex> {
        ensure_mut(&mut self.ids, &self.root)
    }

    pub fn documents_mut(&mut self) -> Result<&mut DocumentIndex> {
        ensure_mut(&mut self.documents, &self.root)
    }

    pub fn tags_mut(&mut self) -> Result<&mut TagIndex> {
        ensure_mut(&mut self.tags, &self.root)
    }

    pub fn embeddings_mut(&mut self) -> Result<&mut EmbeddingIndex> {
        ensure_mut(&mut self.embeddings, &self.root)
    }

    /// Remove every contribution of `topic` from all four indexes.
    ///
    /// Returns the ids that were dropped.
    pub fn purge_topic(&mut self, topic: &str) -> Result<BTreeSet<String>> {
        let removed = self.ids_mut()?.purge_topic(topic);
        self.documents_mut()?.purge_topic(topic);
        self.tags_mut()?.remove_ids(&removed);
        self.embeddings_mut()?.remove_ids(&removed);
        tracing::debug!(topic, removed = removed.len(), "purged topic from indexes");
        Ok(removed)
    }

    /// Write all four indexes to disk.
    pub fn save_all(&self) -> Result<()> {
        self.ids()?.save(&self.root)?;
        self.documents()?.save(&self.root)?;
        self.tags()?.save(&self.root)?;
        self.embeddings()?.save(&self.root)?;
        Ok(())
    }

    /// Drop every cached index; the next access reloads from disk.
    pub fn invalidate(&mut self) {
        self.ids = OnceLock::new();
        self.documents = OnceLock::new();
        self.tags = OnceLock::new();
        self.embeddings = OnceLock::new();
    }
}
