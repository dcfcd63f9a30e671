//! `ctxpack search` and `ctxpack documents`: run a query and print results.
//!
//! The scoring itself lives in [`context_pack_core::search`]; this module
//! only formats pages for a terminal, or as pretty JSON with `--json`.

use anyhow::Result;

use context_pack_core::embedding::Embedder;
use context_pack_core::search::{
    search, search_documents, DocumentPage, DocumentQuery, SearchOptions, SearchPage,
};
use context_pack_core::store::JsonlStore;

pub async fn run_search(
    store: &JsonlStore,
    embedder: &dyn Embedder,
    query: &str,
    options: &SearchOptions,
    json: bool,
) -> Result<()> {
    let page = search(store, embedder, query, options).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_hits(&page);
    }
    Ok(())
}

fn print_hits(page: &SearchPage) {
    if page.hits.is_empty() {
        println!("No results.");
        return;
    }

    for (i, hit) in page.hits.iter().enumerate() {
        let title = if hit.section_path.is_empty() {
            "(preamble)".to_string()
        } else {
            hit.section_path.join(" > ")
        };
        println!("{}. [{:.2}] {} / {}", i + 1, hit.score, hit.topic, title);
        println!("    document: {}", hit.document);
        println!("    corpus: {}", hit.corpus.as_str());
        if let Some(language) = &hit.language {
            println!("    language: {}", language);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.snippet, 160));
        println!("    id: {}", hit.id);
        println!();
    }
    if let Some(cursor) = &page.next_cursor {
        println!("next cursor: {}", cursor);
    }
}

pub fn run_documents(store: &JsonlStore, query: &DocumentQuery, json: bool) -> Result<()> {
    let page = search_documents(store.index(), query)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_documents(&page);
    }
    Ok(())
}

fn print_documents(page: &DocumentPage) {
    if page.documents.is_empty() {
        println!("No documents.");
        return;
    }
    for doc in &page.documents {
        println!(
            "{}  ({} sections, {})",
            doc.document,
            doc.entry.sections.len(),
            doc.entry.corpus.as_str()
        );
    }
    if let Some(cursor) = &page.next_cursor {
        println!();
        println!("next cursor: {}", cursor);
    }
}

/// First `max` chars of `text` on one line.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}
