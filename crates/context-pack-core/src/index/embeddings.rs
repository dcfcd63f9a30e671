//! Packed vector table.
//!
//! `embeddings.json` holds the header `{dimensions, rows, map}`;
//! `embeddings.bin` holds `rows × dimensions` little-endian f32 values in
//! row order. A blob whose size disagrees with the header is read as far
//! as it goes instead of failing.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{index_dir, load_json, save_json, Persist};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::Chunk;

/// JSON header stored in `embeddings.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingHeader {
    pub dimensions: usize,
    pub rows: usize,
    pub map: BTreeMap<String, usize>,
}

/// Chunk id → row of the packed vector table.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    map: BTreeMap<String, usize>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// Append the chunk's vector as a new row.
    ///
    /// Chunks without an embedding get no row. A vector whose length
    /// differs from the rows already in the table is rejected.
    pub fn index(&mut self, chunk: &Chunk) -> Result<()> {
        if chunk.embedding.is_empty() {
            return Ok(());
        }
        let dims = self.dimensions();
        if dims != 0 && chunk.embedding.len() != dims {
            bail!(
                "embedding for {} has {} dimensions, table has {}",
                chunk.id,
                chunk.embedding.len(),
                dims
            );
        }
        self.map.insert(chunk.id.clone(), self.vectors.len());
        self.vectors.push(chunk.embedding.clone());
        Ok(())
    }

    /// The vector of `id`, if it has a usable row.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        let row = *self.map.get(id)?;
        self.vectors.get(row).map(Vec::as_slice)
    }

    pub fn row(&self, id: &str) -> Option<usize> {
        self.map.get(id).copied()
    }

    /// Width of the table, taken from the first row (0 when empty).
    pub fn dimensions(&self) -> usize {
        self.vectors.first().map(Vec::len).unwrap_or(0)
    }

    pub fn rows(&self) -> usize {
        self.vectors.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop the rows of `ids` and re-pack the table.
    pub fn remove_ids(&mut self, ids: &BTreeSet<String>) {
        if ids.is_empty() {
            return;
        }
        let mut by_row: Vec<(usize, String)> = self
            .map
            .iter()
            .filter(|(id, _)| !ids.contains(*id))
            .map(|(id, row)| (*row, id.clone()))
            .collect();
        by_row.sort();

        let mut map = BTreeMap::new();
        let mut vectors = Vec::with_capacity(by_row.len());
        for (row, id) in by_row {
            let Some(vector) = self.vectors.get(row) else {
                continue;
            };
            map.insert(id, vectors.len());
            vectors.push(vector.clone());
        }
        self.map = map;
        self.vectors = vectors;
    }
}

impl Persist for EmbeddingIndex {
    fn load(root: &Path) -> Result<Self> {
        let dir = index_dir(root);
        let header: EmbeddingHeader = load_json(&dir.join("embeddings.json"))?;
        let mut index = EmbeddingIndex {
            map: header.map,
            vectors: Vec::new(),
        };

        let bin = dir.join("embeddings.bin");
        if !bin.exists() || header.dimensions == 0 || header.rows == 0 {
            index.map.clear();
            return Ok(index);
        }

        let bytes =
            std::fs::read(&bin).with_context(|| format!("Failed to read {}", bin.display()))?;
        let floats = blob_to_vec(&bytes);
        let usable = floats.len() / header.dimensions;
        let rows = match header.dimensions.checked_mul(header.rows) {
            Some(expected) if expected <= floats.len() => header.rows,
            _ => {
                tracing::warn!(
                    path = %bin.display(),
                    header_rows = header.rows,
                    usable_rows = usable,
                    "embedding table shorter than its header, truncating"
                );
                usable.min(header.rows)
            }
        };

        index.vectors = floats
            .chunks_exact(header.dimensions)
            .take(rows)
            .map(<[f32]>::to_vec)
            .collect();
        // ids pointing past the table would alias rows appended later
        index.map.retain(|_, row| *row < rows);
        Ok(index)
    }

    fn save(&self, root: &Path) -> Result<()> {
        let dir = index_dir(root);
        let dimensions = self.dimensions();
        if dimensions == 0 {
            return save_json(&dir.join("embeddings.json"), &EmbeddingHeader::default());
        }

        let mut blob = Vec::with_capacity(self.vectors.len() * dimensions * 4);
        for vector in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(vector));
        }
        save_json(
            &dir.join("embeddings.json"),
            &EmbeddingHeader {
                dimensions,
                rows: self.vectors.len(),
                map: self.map.clone(),
            },
        )?;
        let bin = dir.join("embeddings.bin");
        std::fs::write(&bin, blob).with_context(|| format!("Failed to write {}", bin.display()))
    }
}
