//! # Context Pack CLI (`ctxpack`)
//!
//! The `ctxpack` binary ingests Markdown into a context pack and exposes
//! every retrieval operation of the core as a subcommand.
//!
//! ## Usage
//!
//! ```bash
//! ctxpack --config ./ctxpack.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxpack ingest` | Chunk, embed and index the configured inputs |
//! | `ctxpack search "<query>"` | Hybrid section search |
//! | `ctxpack documents` | Browse documents |
//! | `ctxpack tags` / `suggest-tags` | Browse tags, map phrases to known tags |
//! | `ctxpack topics` | List configured topics |
//! | `ctxpack sections` / `fetch` / `document` / `cite` | Read sections back |
//! | `ctxpack related` / `expand` | Neighbouring and shared-tag sections |
//! | `ctxpack dedupe` / `compare` | Near-duplicates, pairwise comparison |
//! | `ctxpack export` / `gather` / `code` | Export text, bounded context, code blocks |
//! | `ctxpack checklist` / `enforce` / `brief` | Rule-driven helpers |
//! | `ctxpack validate` | Check topic and tag filters |
//! | `ctxpack stats` / `drop` | Store overview, remove a topic |
//!
//! Structured results print as pretty JSON on stdout. Logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use context_pack::config::{self, Config};
use context_pack::{embedding, ingest, search, stats, storage};
use context_pack_core::brief::{build_brief, BriefRequest};
use context_pack_core::compare::{compare, CompareOptions};
use context_pack_core::dedupe::{dedupe, KeepStrategy, DEFAULT_THRESHOLD};
use context_pack_core::embedding::Embedder;
use context_pack_core::expand::{expand, related, ExpandOptions, RelatedStrategy};
use context_pack_core::export::{export, extract_code, gather, ContextSelection, ExportFormat, GatherOptions};
use context_pack_core::models::Corpus;
use context_pack_core::rules::{checklist, enforce_rules, ChecklistFormat};
use context_pack_core::search::{
    search_tags, suggest_tags, DocumentQuery, Filters, SearchMode, SearchOptions, DEFAULT_DOCUMENT_LIMIT,
    DEFAULT_SEARCH_LIMIT,
};
use context_pack_core::sections::{cite, document, document_sections, sections_by_ids, Window};
use context_pack_core::store::JsonlStore;
use context_pack_core::validate::validate_filters;

/// Context Pack: Markdown context packs for AI tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Relative paths inside it resolve against its directory.
#[derive(Parser)]
#[command(
    name = "ctxpack",
    about = "Context Pack: chunk, index and search Markdown context for AI tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ctxpack.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Topic and tag filters shared by the search-backed commands.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Restrict to these topics.
    #[arg(long = "topic", value_delimiter = ',')]
    topics: Vec<String>,

    /// Match at least one of these tags.
    #[arg(long = "include", value_delimiter = ',')]
    include: Vec<String>,

    /// Match every one of these tags.
    #[arg(long = "require", value_delimiter = ',')]
    require: Vec<String>,

    /// Match none of these tags.
    #[arg(long = "exclude", value_delimiter = ',')]
    exclude: Vec<String>,
}

impl FilterArgs {
    fn into_filters(self) -> Filters {
        Filters {
            topics: self.topics,
            include_tags: self.include,
            require_tags: self.require,
            exclude_tags: self.exclude,
        }
    }
}

/// Either explicit section ids or a `(topic, document)` pair.
#[derive(Args, Debug)]
struct SelectionArgs {
    /// Section ids.
    ids: Vec<String>,

    #[arg(long)]
    topic: Option<String>,

    /// Document path within the topic.
    #[arg(long)]
    document: Option<String>,

    /// Section ids or `A > B` heading paths within the document.
    #[arg(long = "section")]
    sections: Vec<String>,
}

impl SelectionArgs {
    fn into_selection(self) -> Result<ContextSelection> {
        ContextSelection::from_parts(self.ids, self.topic, self.document, self.sections)
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index the configured inputs.
    ///
    /// Each topic is rebuilt from scratch: its record file is truncated
    /// and its index entries removed before the new records are written.
    Ingest {
        /// Only ingest this topic.
        #[arg(long)]
        topic: Option<String>,

        /// Report document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search sections.
    Search {
        query: String,

        /// `simple` (lexical), `semantic` (embedding) or `hybrid` (both).
        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[command(flatten)]
        filters: FilterArgs,

        /// Prefer sections containing fenced code.
        #[arg(long)]
        snippet: bool,

        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Cursor from a previous page.
        #[arg(long)]
        cursor: Option<String>,

        /// Print the raw JSON page.
        #[arg(long)]
        json: bool,
    },

    /// Browse documents.
    Documents {
        #[command(flatten)]
        filters: FilterArgs,

        /// `ruleset` or `knowledge`.
        #[arg(long)]
        corpus: Option<String>,

        /// `title`, `sections` or `topic`.
        #[arg(long, default_value = "title")]
        sort: String,

        /// `asc` or `desc`.
        #[arg(long, default_value = "asc")]
        order: String,

        #[arg(long, default_value_t = DEFAULT_DOCUMENT_LIMIT)]
        limit: usize,

        #[arg(long)]
        cursor: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List tags by number of sections, optionally filtered by substring.
    Tags {
        query: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Map free-text phrases to known tags.
    SuggestTags {
        phrases: Vec<String>,

        /// Only suggest tags starting with one of these prefixes.
        #[arg(long = "namespace")]
        namespaces: Vec<String>,

        /// Suggestions per phrase (1-10).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List configured topics.
    Topics,

    /// Table of contents of one document.
    Sections { topic: String, document: String },

    /// Fetch sections by id, with optional neighbours.
    Fetch {
        ids: Vec<String>,

        #[arg(long, default_value_t = 0)]
        before: usize,

        #[arg(long, default_value_t = 0)]
        after: usize,
    },

    /// A whole document, or selected sections of it.
    Document {
        topic: String,
        document: String,

        /// Section ids or `A > B` heading paths.
        #[arg(long = "section")]
        sections: Vec<String>,
    },

    /// Citation metadata for section ids.
    Cite { ids: Vec<String> },

    /// Sections related to one section.
    Related {
        id: String,

        /// `tags` or `document`.
        #[arg(long, default_value = "tags")]
        strategy: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Expand seed ids with neighbours and shared-tag sections.
    Expand {
        ids: Vec<String>,

        #[arg(long, default_value_t = 0)]
        before: usize,

        #[arg(long, default_value_t = 0)]
        after: usize,

        /// Also add sections sharing tags with the seeds.
        #[arg(long)]
        related_by_tags: bool,

        #[arg(long)]
        limit_related: Option<usize>,

        /// Keep repeated ids in the expanded list.
        #[arg(long)]
        keep_duplicates: bool,
    },

    /// Drop near-duplicate sections.
    Dedupe {
        ids: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// `first`, `longest` or `highest-rank`.
        #[arg(long, default_value = "first")]
        keep: String,
    },

    /// Compare every left id with every right id.
    Compare {
        #[arg(long, value_delimiter = ',', required = true)]
        left: Vec<String>,

        #[arg(long, value_delimiter = ',', required = true)]
        right: Vec<String>,

        /// Skip cosine similarity.
        #[arg(long)]
        no_similarity: bool,

        /// Skip rule/heading/length hints.
        #[arg(long)]
        no_hints: bool,
    },

    /// Export sections as JSON or Markdown.
    Export {
        #[command(flatten)]
        selection: SelectionArgs,

        /// `json` or `markdown`.
        #[arg(long, default_value = "json")]
        format: String,

        /// Only section text, no ids or tags.
        #[arg(long)]
        no_meta: bool,
    },

    /// Gather section texts under a character cap.
    Gather {
        #[command(flatten)]
        selection: SelectionArgs,

        #[arg(long)]
        max_chars: Option<usize>,

        /// Keep fenced code blocks.
        #[arg(long)]
        keep_code: bool,

        /// Print the joined text instead of JSON.
        #[arg(long)]
        text: bool,
    },

    /// Extract fenced code blocks.
    Code {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Rules relevant to a task, grouped by level.
    Checklist {
        task: String,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[arg(long)]
        limit: Option<usize>,

        /// `json` or `markdown`.
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Rules that apply to a draft.
    Enforce {
        /// Draft text; read from `--file` when omitted.
        draft: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Brief scaffold for a writing or coding task.
    Brief {
        task: String,

        #[arg(long)]
        audience: Option<String>,

        #[arg(long)]
        deliverable: Option<String>,

        #[arg(long)]
        tone: Option<String>,

        #[arg(long = "constraint")]
        constraints: Vec<String>,

        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check topics and tags against the store.
    Validate {
        #[command(flatten)]
        filters: FilterArgs,

        /// Do not suggest replacements for unknown tags.
        #[arg(long)]
        no_suggest: bool,
    },

    /// Store statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Delete a topic's records and index entries.
    Drop { topic: String },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RUST_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// The configured provider, or none at all for lexical-only queries.
fn provider_for(cfg: &Config, mode: SearchMode) -> Result<Box<dyn Embedder>> {
    if mode == SearchMode::Simple {
        return Ok(Box::new(embedding::DisabledProvider));
    }
    embedding::create_provider(&cfg.embedding)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_config(&cli.config)?;

    // Topics needs no store
    if let Commands::Topics = cli.command {
        return print_json(&cfg.topics());
    }

    let mut store = storage::open(&cfg)?;

    match cli.command {
        Commands::Topics => {}
        Commands::Ingest { topic, dry_run } => {
            let embedder = embedding::create_provider(&cfg.embedding)?;
            let summary =
                ingest::run_ingest(&cfg, &mut store, embedder.as_ref(), topic.as_deref(), dry_run)
                    .await?;
            summary.print();
        }
        Commands::Search {
            query,
            mode,
            filters,
            snippet,
            limit,
            cursor,
            json,
        } => {
            let mode: SearchMode = mode.parse()?;
            let embedder = provider_for(&cfg, mode)?;
            let options = SearchOptions {
                filters: filters.into_filters(),
                snippet_only: snippet,
                mode,
                limit,
                cursor,
            };
            search::run_search(&store, embedder.as_ref(), &query, &options, json).await?;
        }
        Commands::Documents {
            filters,
            corpus,
            sort,
            order,
            limit,
            cursor,
            json,
        } => {
            let query = DocumentQuery {
                filters: filters.into_filters(),
                corpus: corpus.map(|c| c.parse::<Corpus>()).transpose()?,
                sort: sort.parse()?,
                order: order.parse()?,
                limit,
                cursor,
            };
            search::run_documents(&store, &query, json)?;
        }
        Commands::Tags { query, limit } => {
            print_json(&search_tags(store.index(), query.as_deref(), limit)?)?;
        }
        Commands::SuggestTags {
            phrases,
            namespaces,
            limit,
        } => {
            if phrases.is_empty() {
                bail!("Provide at least one phrase.");
            }
            print_json(&suggest_tags(store.index(), &phrases, &namespaces, limit)?)?;
        }
        Commands::Sections { topic, document } => {
            print_json(&document_sections(&store, &topic, &document)?)?;
        }
        Commands::Fetch { ids, before, after } => {
            let window = Window::new(before, after);
            print_json(&sections_by_ids(&store, &ids, Some(window))?)?;
        }
        Commands::Document {
            topic,
            document: path,
            sections,
        } => match document(&store, &topic, &path, &sections)? {
            Some(view) => print_json(&view)?,
            None => print_json(&serde_json::json!({
                "topic": topic,
                "document": path,
                "error": "not_found",
            }))?,
        },
        Commands::Cite { ids } => {
            print_json(&cite(&store, &ids)?)?;
        }
        Commands::Related {
            id,
            strategy,
            limit,
        } => {
            let strategy: RelatedStrategy = strategy.parse()?;
            print_json(&related(&store, &id, strategy, limit)?)?;
        }
        Commands::Expand {
            ids,
            before,
            after,
            related_by_tags,
            limit_related,
            keep_duplicates,
        } => {
            let options = ExpandOptions {
                neighbors: Some(Window::new(before, after)),
                related_by_tags,
                limit_related,
                unique_only: !keep_duplicates,
            };
            print_json(&expand(&store, &ids, &options)?)?;
        }
        Commands::Dedupe {
            ids,
            threshold,
            keep,
        } => {
            let strategy: KeepStrategy = keep.parse()?;
            print_json(&dedupe(&store, &ids, threshold, strategy)?)?;
        }
        Commands::Compare {
            left,
            right,
            no_similarity,
            no_hints,
        } => {
            let options = CompareOptions {
                similarity: !no_similarity,
                diff_hints: !no_hints,
            };
            print_json(&compare(&store, &left, &right, options)?)?;
        }
        Commands::Export {
            selection,
            format,
            no_meta,
        } => {
            let format: ExportFormat = format.parse()?;
            let selection = selection.into_selection()?;
            print_json(&export(&store, &selection, format, !no_meta)?)?;
        }
        Commands::Gather {
            selection,
            max_chars,
            keep_code,
            text,
        } => {
            let selection = selection.into_selection()?;
            let options = GatherOptions {
                max_chars,
                strip_code: !keep_code,
            };
            let gathered = gather(&store, &selection, options)?;
            if text {
                println!("{}", gathered.joined());
            } else {
                print_json(&gathered)?;
            }
        }
        Commands::Code { selection } => {
            let selection = selection.into_selection()?;
            print_json(&extract_code(&store, &selection)?)?;
        }
        Commands::Checklist {
            task,
            filters,
            mode,
            limit,
            format,
        } => {
            let format: ChecklistFormat = format.parse()?;
            let mode: SearchMode = mode.parse()?;
            let embedder = provider_for(&cfg, mode)?;
            let list = checklist(
                &store,
                embedder.as_ref(),
                &task,
                &filters.into_filters(),
                mode,
                limit,
            )
            .await?;
            match format {
                ChecklistFormat::Json => print_json(&list)?,
                ChecklistFormat::Markdown => println!("{}", list.to_markdown()),
            }
        }
        Commands::Enforce {
            draft,
            file,
            filters,
            mode,
            limit,
        } => {
            let draft = match (draft, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read draft {}", path.display()))?,
                (None, None) => bail!("Provide a draft or --file."),
            };
            let mode: SearchMode = mode.parse()?;
            let embedder = provider_for(&cfg, mode)?;
            let enforcement = enforce_rules(
                &store,
                embedder.as_ref(),
                &draft,
                &filters.into_filters(),
                mode,
                limit,
            )
            .await?;
            print_json(&enforcement)?;
        }
        Commands::Brief {
            task,
            audience,
            deliverable,
            tone,
            constraints,
            filters,
            mode,
            limit,
        } => {
            let mode: SearchMode = mode.parse()?;
            let embedder = provider_for(&cfg, mode)?;
            let request = BriefRequest {
                task,
                audience,
                deliverable,
                tone,
                constraints,
                filters: filters.into_filters(),
                mode,
                limit,
            };
            print_json(&build_brief(&store, embedder.as_ref(), request).await?)?;
        }
        Commands::Validate {
            filters,
            no_suggest,
        } => {
            print_json(&validate_filters(&store, &filters.into_filters(), !no_suggest)?)?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&store, json)?;
        }
        Commands::Drop { topic } => {
            run_drop(&cfg, &mut store, &topic)?;
        }
    }

    Ok(())
}

fn run_drop(cfg: &Config, store: &mut JsonlStore, topic: &str) -> Result<()> {
    if cfg.input(topic).is_none() {
        bail!(
            "Unknown topic: '{}'. Configured: {}",
            topic,
            cfg.topics().join(", ")
        );
    }
    store.drop_topic(topic)?;
    let removed = store.index_mut().purge_topic(topic)?;
    store.index().save_all()?;
    tracing::info!(topic, removed = removed.len(), "dropped topic");
    println!("dropped {} ({} sections)", topic, removed.len());
    Ok(())
}
