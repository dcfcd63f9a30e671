//! # Context Pack
//!
//! Turns folders of Markdown into searchable context packs for AI tools.
//!
//! Documents are split into heading-addressed sections, appended to one
//! JSONL record file per topic, and indexed four ways (ids, documents,
//! tags, embeddings). Queries combine embedding similarity with lexical
//! boosts and topic/tag filters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Markdown   │──▶│  Ingest      │──▶│ <topic>.jsonl    │
//! │  [[inputs]] │   │ Chunk+Embed  │   │ index/*.json,bin │
//! └─────────────┘   └──────────────┘   └────────┬─────────┘
//!                                               │
//!                                               ▼
//!                                         ┌──────────┐
//!                                         │   CLI    │
//!                                         │(ctxpack) │
//!                                         └──────────┘
//! ```
//!
//! The storage and retrieval core is the `context-pack-core` crate; this
//! crate adds configuration, embedding providers, ingestion and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! ctxpack ingest                         # chunk, embed and index every topic
//! ctxpack search "error handling"        # hybrid search
//! ctxpack checklist "write a CLI" --format md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider implementations |
//! | [`ingest`] | File discovery, front matter and the ingest pipeline |
//! | [`storage`] | Opening the record store from config |
//! | [`search`] | Terminal rendering of search results |
//! | [`stats`] | Store statistics |

pub mod config;
pub mod embedding;
pub mod ingest;
pub mod search;
pub mod stats;
pub mod storage;
