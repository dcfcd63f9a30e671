use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{index_dir, load_json, save_json, Persist};
use crate::models::{Chunk, IdEntry, StorePointer};

/// Chunk id → [`IdEntry`]. Persisted as `index/ids.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdIndex {
    entries: BTreeMap<String, IdEntry>,
}

impl IdIndex {
    pub fn get(&self, id: &str) -> Option<&IdEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn set(&mut self, id: impl Into<String>, entry: IdEntry) {
        self.entries.insert(id.into(), entry);
    }

    /// Record a freshly stored chunk.
    pub fn index(&mut self, chunk: &Chunk, pointer: &StorePointer) {
        self.set(
            chunk.id.clone(),
            IdEntry {
                database: pointer.file.clone(),
                offset: pointer.offset,
                length: pointer.length,
                topic: chunk.topic.clone(),
                document: chunk.path.clone(),
                section: chunk.section.clone(),
                headings: chunk.headings.clone(),
                tags: chunk.tags.clone(),
                rank: chunk.rank,
                corpus: chunk.corpus(),
            },
        );
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IdEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry of `topic` and return the removed ids.
    pub fn purge_topic(&mut self, topic: &str) -> BTreeSet<String> {
        let removed: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.topic == topic)
            .map(|(id, _)| id.clone())
            .collect();
        self.entries.retain(|id, _| !removed.contains(id));
        removed
    }
}

impl Persist for IdIndex {
    fn load(root: &Path) -> Result<Self> {
        load_json(&index_dir(root).join("ids.json"))
    }

    fn save(&self, root: &Path) -> Result<()> {
        save_json(&index_dir(root).join("ids.json"), self)
    }
}
