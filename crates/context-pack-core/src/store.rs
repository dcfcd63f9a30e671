//! Append-only JSONL record store.
//!
//! Each topic owns one file, `<root>/<topic>.jsonl`, holding one JSON
//! [`Chunk`] per line. [`JsonlStore::insert`] returns a [`StorePointer`]
//! (file, byte offset, byte length) and point lookups read exactly that
//! byte range, so a lookup never scans the file.
//!
//! # Concurrency
//!
//! One writer per topic file. Reads of written records are safe alongside
//! ingestion of other topics because pointers are immutable once written;
//! [`purge`](JsonlStore::purge) and [`drop_topic`](JsonlStore::drop_topic)
//! must not race with reads of the same topic.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::index::IndexManager;
use crate::models::{Chunk, StorePointer};

/// Record store plus the indexes built over it.
#[derive(Debug)]
pub struct JsonlStore {
    root: PathBuf,
    topics: Vec<String>,
    index: IndexManager,
    cache: RwLock<HashMap<String, Arc<Vec<Chunk>>>>,
}

impl JsonlStore {
    /// Open (creating if needed) the storage root for the given topics.
    pub fn open(root: impl Into<PathBuf>, topics: Vec<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage root {}", root.display()))?;
        Ok(Self {
            index: IndexManager::new(&root),
            root,
            topics,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Topics this store was opened with.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut IndexManager {
        &mut self.index
    }

    /// Record file name of `topic`, relative to the root.
    pub fn file_name(topic: &str) -> String {
        format!("{}.jsonl", topic)
    }

    pub fn file_for(&self, topic: &str) -> PathBuf {
        self.root.join(Self::file_name(topic))
    }

    /// Append one record and return its pointer.
    ///
    /// The offset is the file size before the write and the length covers
    /// the encoded record plus its newline, so consecutive inserts satisfy
    /// `offset(n + 1) == offset(n) + length(n)`.
    pub fn insert(&self, topic: &str, chunk: &Chunk) -> Result<StorePointer> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.file_for(topic);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let offset = file.metadata()?.len();

        let mut line = serde_json::to_vec(chunk)?;
        line.push(b'\n');
        file.write_all(&line)
            .with_context(|| format!("Failed to append to {}", path.display()))?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);

        Ok(StorePointer {
            file: Self::file_name(topic),
            offset,
            length: line.len() as u64,
        })
    }

    /// Read the single record at `pointer`.
    pub fn read_at(&self, pointer: &StorePointer) -> Result<Chunk> {
        let path = self.root.join(&pointer.file);
        let mut file =
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        file.seek(SeekFrom::Start(pointer.offset))?;
        let mut buf = vec![0u8; pointer.length as usize];
        file.read_exact(&mut buf).with_context(|| {
            format!(
                "Failed to read {} bytes at offset {} of {}",
                pointer.length,
                pointer.offset,
                path.display()
            )
        })?;
        serde_json::from_slice(buf.trim_ascii_end()).with_context(|| {
            format!(
                "Malformed record at offset {} of {}",
                pointer.offset,
                path.display()
            )
        })
    }

    /// Point lookup through the id index. `Ok(None)` for unknown ids.
    pub fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let Some(entry) = self.index.ids()?.get(id) else {
            return Ok(None);
        };
        self.read_at(&entry.pointer()).map(Some)
    }

    /// Every record of one topic, read once and cached until purged.
    pub fn load_topic(&self, topic: &str) -> Result<Arc<Vec<Chunk>>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return Ok(Arc::clone(cached));
        }

        let chunks = Arc::new(read_jsonl(&self.file_for(topic))?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string(), Arc::clone(&chunks));
        Ok(chunks)
    }

    /// Full scan of one topic, or of every configured topic when `None`.
    pub fn load(&self, topic: Option<&str>) -> Result<Vec<Chunk>> {
        match topic {
            Some(topic) => Ok(self.load_topic(topic)?.as_ref().clone()),
            None => {
                let mut all = Vec::new();
                for topic in &self.topics {
                    all.extend(self.load_topic(topic)?.iter().cloned());
                }
                Ok(all)
            }
        }
    }

    /// Truncate the topic's file (creating it if absent) and reset its cache.
    pub fn purge(&self, topic: &str) -> Result<()> {
        let path = self.file_for(topic);
        File::create(&path).with_context(|| format!("Failed to truncate {}", path.display()))?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string(), Arc::new(Vec::new()));
        Ok(())
    }

    /// Store a chunk and feed it to all four indexes.
    pub fn add(&mut self, chunk: &Chunk) -> Result<StorePointer> {
        let pointer = self.insert(&chunk.topic, chunk)?;
        self.index.ids_mut()?.index(chunk, &pointer);
        self.index.documents_mut()?.index(chunk);
        self.index.tags_mut()?.index(chunk);
        self.index.embeddings_mut()?.index(chunk)?;
        Ok(pointer)
    }

    /// Empty the topic's file and strip its contributions from the indexes.
    pub fn reset_topic(&mut self, topic: &str) -> Result<usize> {
        self.purge(topic)?;
        Ok(self.index.purge_topic(topic)?.len())
    }

    /// Delete the topic's file entirely.
    pub fn drop_topic(&self, topic: &str) -> Result<()> {
        let path = self.file_for(topic);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
        Ok(())
    }
}

/// Parse a JSONL file; a missing file is empty, a bad line is an error.
fn read_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut chunks = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk = serde_json::from_str(&line)
            .with_context(|| format!("Malformed record at {}:{}", path.display(), n + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrontMatter;
    use tempfile::TempDir;

    fn chunk(n: usize) -> Chunk {
        Chunk {
            id: format!("t:a.md#{}", n),
            topic: "t".into(),
            path: "a.md".into(),
            section: n.to_string(),
            headings: vec![format!("Heading {}", n)],
            rule: None,
            text: "é".repeat(n + 1),
            tags: vec!["t".into()],
            data: FrontMatter::new(),
            rank: Some(n as f64),
            embedding: vec![n as f32, 0.5],
        }
    }

    fn store(tmp: &TempDir) -> JsonlStore {
        JsonlStore::open(tmp.path().join("db"), vec!["t".into()]).unwrap()
    }

    #[test]
    fn test_offsets_are_contiguous() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let pointers: Vec<_> = (0..5).map(|n| store.insert("t", &chunk(n)).unwrap()).collect();
        assert_eq!(pointers[0].offset, 0);
        for pair in pointers.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].length);
        }
        let size = std::fs::metadata(store.file_for("t")).unwrap().len();
        let last = pointers.last().unwrap();
        assert_eq!(size, last.offset + last.length);
    }

    #[test]
    fn test_read_at_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut pointers = Vec::new();
        for n in 0..3 {
            pointers.push(store.insert("t", &chunk(n)).unwrap());
        }
        assert_eq!(store.read_at(&pointers[1]).unwrap(), chunk(1));
    }

    #[test]
    fn test_get_through_id_index() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        let c = chunk(2);
        let pointer = store.insert("t", &c).unwrap();
        store.index_mut().ids_mut().unwrap().index(&c, &pointer);
        assert_eq!(store.get(&c.id).unwrap(), Some(c));
        assert_eq!(store.get("t:missing.md#1").unwrap(), None);
    }

    #[test]
    fn test_load_and_purge() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for n in 0..3 {
            store.insert("t", &chunk(n)).unwrap();
        }
        assert_eq!(store.load(Some("t")).unwrap().len(), 3);
        assert_eq!(store.load(None).unwrap().len(), 3);

        store.purge("t").unwrap();
        assert!(store.load(Some("t")).unwrap().is_empty());
        assert_eq!(std::fs::metadata(store.file_for("t")).unwrap().len(), 0);
    }

    #[test]
    fn test_load_missing_topic_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(store.load(Some("nothing")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_line_fails_loud() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.insert("t", &chunk(0)).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.file_for("t"))
            .unwrap();
        file.write_all(b"{not json\n").unwrap();

        let err = store.load(Some("t")).unwrap_err();
        assert!(format!("{:#}", err).contains(":2"));
    }

    #[test]
    fn test_reset_topic_clears_records_and_indexes() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        for n in 0..3 {
            store.add(&chunk(n)).unwrap();
        }
        assert_eq!(store.index().ids().unwrap().len(), 3);

        assert_eq!(store.reset_topic("t").unwrap(), 3);
        assert!(store.index().ids().unwrap().is_empty());
        assert!(store.index().embeddings().unwrap().is_empty());
        assert!(store.load(Some("t")).unwrap().is_empty());

        // re-adding after a reset starts at offset 0 again
        let pointer = store.add(&chunk(0)).unwrap();
        assert_eq!(pointer.offset, 0);
        assert_eq!(store.get(&chunk(0).id).unwrap(), Some(chunk(0)));
    }

    #[test]
    fn test_drop_topic_deletes_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.insert("t", &chunk(0)).unwrap();
        store.drop_topic("t").unwrap();
        assert!(!store.file_for("t").exists());
        assert!(store.load(Some("t")).unwrap().is_empty());
    }
}
