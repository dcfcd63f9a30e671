//! # Context Pack Core
//!
//! Storage and retrieval core for context packs: the Markdown chunker, the
//! append-only JSONL record store, the four indexes, hybrid search, and the
//! operations derived from them.
//!
//! Embedding generation is not done here. Callers hand in an
//! [`embedding::Embedder`]; providers live in the `context-pack` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Chunks, pointers, index entries, numeric-aware ordering |
//! | [`chunk`] | Markdown section chunker |
//! | [`store`] | Per-topic JSONL record store |
//! | [`index`] | Id, document, tag and embedding indexes + manager |
//! | [`embedding`] | Embedder trait and vector utilities |
//! | [`search`] | Section, document and tag search |
//! | [`sections`] | Section/document reconstruction and citations |
//! | [`expand`] | Neighbour and shared-tag expansion |
//! | [`dedupe`] | Near-duplicate elimination |
//! | [`compare`] | Pairwise comparison |
//! | [`export`] | Export, gather and code extraction |
//! | [`rules`] | Rule checklists and enforcement |
//! | [`brief`] | Brief scaffolds |
//! | [`validate`] | Filter validation |

pub mod brief;
pub mod chunk;
pub mod compare;
pub mod dedupe;
pub mod embedding;
pub mod expand;
pub mod export;
pub mod index;
pub mod models;
pub mod rules;
pub mod search;
pub mod sections;
pub mod store;
pub mod validate;

#[cfg(test)]
mod test_support;
