//! Pairwise comparison of two id sets.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::cosine;
use crate::models::RuleLevel;
use crate::store::JsonlStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Side {
    pub id: String,
    pub headings: Vec<String>,
    pub rule: Option<RuleLevel>,
    /// Body length in characters; 0 when the id is unknown.
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffHints {
    pub rule_changed: bool,
    pub heading_changed: bool,
    /// `right.length - left.length`.
    pub length_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pair {
    pub left: Side,
    pub right: Side,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<DiffHints>,
}

#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    pub similarity: bool,
    pub diff_hints: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            similarity: true,
            diff_hints: true,
        }
    }
}

fn side(store: &JsonlStore, id: &str) -> Result<Side> {
    let chunk = store.get(id)?;
    Ok(Side {
        id: id.to_string(),
        headings: chunk.as_ref().map(|c| c.headings.clone()).unwrap_or_default(),
        rule: chunk.as_ref().and_then(|c| c.rule),
        length: chunk.map_or(0, |c| c.text.chars().count()),
    })
}

/// Every `left × right` pair, in left-major order.
pub fn compare(
    store: &JsonlStore,
    left_ids: &[String],
    right_ids: &[String],
    options: CompareOptions,
) -> Result<Vec<Pair>> {
    let embeddings = store.index().embeddings()?;
    let mut pairs = Vec::with_capacity(left_ids.len() * right_ids.len());

    for left_id in left_ids {
        let left = side(store, left_id)?;
        for right_id in right_ids {
            let right = side(store, right_id)?;

            let cosine = if options.similarity {
                match (embeddings.vector(left_id), embeddings.vector(right_id)) {
                    (Some(a), Some(b)) => Some(cosine(a, b)),
                    _ => None,
                }
            } else {
                None
            };

            let hints = options.diff_hints.then(|| DiffHints {
                rule_changed: left.rule != right.rule,
                heading_changed: left.headings.join(" > ") != right.headings.join(" > "),
                length_delta: right.length as i64 - left.length as i64,
            });

            pairs.push(Pair {
                left: left.clone(),
                right,
                cosine,
                hints,
            });
        }
    }
    Ok(pairs)
}
