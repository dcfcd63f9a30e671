//! Store statistics and health overview.
//!
//! Summarises what is indexed: per-topic record counts, document counts,
//! embedding coverage and record file sizes. Used by `ctxpack stats` to
//! confirm an ingest did what was expected.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use context_pack_core::store::JsonlStore;

/// Per-topic breakdown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
    pub tags: usize,
    pub dims: usize,
    pub topics: Vec<TopicStats>,
}

pub fn collect_stats(store: &JsonlStore) -> Result<StoreStats> {
    let index = store.index();
    let ids = index.ids()?;
    let embeddings = index.embeddings()?;

    let mut topics: BTreeMap<&str, TopicStats> = store
        .topics()
        .iter()
        .map(|t| {
            let bytes = std::fs::metadata(store.file_for(t))
                .map(|m| m.len())
                .unwrap_or(0);
            (
                t.as_str(),
                TopicStats {
                    topic: t.clone(),
                    bytes,
                    ..Default::default()
                },
            )
        })
        .collect();

    for (id, entry) in ids.iter() {
        if let Some(stats) = topics.get_mut(entry.topic.as_str()) {
            stats.chunks += 1;
            if embeddings.vector(id).is_some() {
                stats.embedded += 1;
            }
        }
    }
    for (_, entry) in index.documents()?.iter() {
        if let Some(stats) = topics.get_mut(entry.topic.as_str()) {
            stats.documents += 1;
        }
    }

    Ok(StoreStats {
        documents: index.documents()?.len(),
        chunks: ids.len(),
        embedded: embeddings.len(),
        tags: index.tags()?.len(),
        dims: embeddings.dimensions(),
        topics: topics.into_values().collect(),
    })
}

/// Run the stats command and print a summary.
pub fn run_stats(store: &JsonlStore, json: bool) -> Result<()> {
    let stats = collect_stats(store)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Context Pack Store Stats");
    println!("========================");
    println!();
    println!("  Root:        {}", store.root().display());
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.chunks,
        if stats.chunks > 0 {
            (stats.embedded * 100) / stats.chunks
        } else {
            0
        }
    );
    println!("  Dimensions:  {}", stats.dims);
    println!("  Tags:        {}", stats.tags);

    if !stats.topics.is_empty() {
        println!();
        println!("  By topic:");
        println!(
            "  {:<24} {:>6} {:>8} {:>10} {:>10}",
            "TOPIC", "DOCS", "CHUNKS", "EMBEDDED", "SIZE"
        );
        println!("  {}", "-".repeat(62));
        for t in &stats.topics {
            println!(
                "  {:<24} {:>6} {:>8} {:>10} {:>10}",
                t.topic,
                t.documents,
                t.chunks,
                t.embedded,
                format_bytes(t.bytes)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
