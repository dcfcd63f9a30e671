//! Near-duplicate elimination over embedding vectors.
//!
//! Ids are processed in input order against the list kept so far. The
//! first kept vector at or above the threshold is *the* duplicate, even
//! if a later kept vector is more similar. Ids without a vector are
//! always kept and never compared against.

use anyhow::{bail, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::embedding::cosine;
use crate::models::Chunk;
use crate::store::JsonlStore;

pub const DEFAULT_THRESHOLD: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepStrategy {
    /// The already-kept id always survives.
    #[default]
    First,
    /// Whichever body is longer; ties keep the earlier id.
    Longest,
    /// Whichever rank is higher (missing rank loses); ties keep the earlier id.
    HighestRank,
}

impl FromStr for KeepStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(KeepStrategy::First),
            "longest" => Ok(KeepStrategy::Longest),
            "highest-rank" => Ok(KeepStrategy::HighestRank),
            other => bail!(
                "Unknown keep strategy: {}. Use first, longest, or highest-rank.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dropped {
    pub id: String,
    pub dupe_of: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupeResult {
    pub kept: Vec<String>,
    pub dropped: Vec<Dropped>,
    pub threshold: f64,
    pub strategy: KeepStrategy,
}

pub fn dedupe(
    store: &JsonlStore,
    ids: &[String],
    threshold: f64,
    strategy: KeepStrategy,
) -> Result<DedupeResult> {
    let embeddings = store.index().embeddings()?;
    let mut kept: Vec<String> = Vec::new();
    let mut dropped = Vec::new();

    for id in ids {
        let Some(vector) = embeddings.vector(id) else {
            kept.push(id.clone());
            continue;
        };

        let dupe = kept.iter().enumerate().find_map(|(slot, previous)| {
            let score = cosine(vector, embeddings.vector(previous)?);
            (score >= threshold).then_some((slot, score))
        });
        let Some((slot, score)) = dupe else {
            kept.push(id.clone());
            continue;
        };

        let previous = kept[slot].clone();
        if incoming_wins(store, strategy, &previous, id)? {
            kept[slot] = id.clone();
            dropped.push(Dropped {
                id: previous.clone(),
                dupe_of: id.clone(),
                score,
            });
        } else {
            dropped.push(Dropped {
                id: id.clone(),
                dupe_of: previous,
                score,
            });
        }
    }

    tracing::debug!(kept = kept.len(), dropped = dropped.len(), "dedupe finished");
    Ok(DedupeResult {
        kept,
        dropped,
        threshold,
        strategy,
    })
}

/// Whether `incoming` replaces `previous` in the kept list.
fn incoming_wins(
    store: &JsonlStore,
    strategy: KeepStrategy,
    previous: &str,
    incoming: &str,
) -> Result<bool> {
    let (before, after) = match strategy {
        KeepStrategy::First => return Ok(false),
        _ => (store.get(previous)?, store.get(incoming)?),
    };
    Ok(match strategy {
        KeepStrategy::Longest => {
            let len = |c: &Option<Chunk>| c.as_ref().map_or(0, |c| c.text.chars().count());
            len(&after) > len(&before)
        }
        _ => {
            let rank = |c: &Option<Chunk>| c.as_ref().and_then(|c| c.rank).unwrap_or(f64::NEG_INFINITY);
            rank(&after) > rank(&before)
        }
    })
}
