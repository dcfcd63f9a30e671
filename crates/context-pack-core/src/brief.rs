//! Brief scaffolds backed by search references.

use anyhow::Result;
use serde::Serialize;

use crate::embedding::Embedder;
use crate::search::{search, Filters, SearchMode, SearchOptions};
use crate::store::JsonlStore;

pub const DEFAULT_BRIEF_LIMIT: usize = 8;
pub const MAX_BRIEF_LIMIT: usize = 20;

const SUGGESTED_OUTLINE: [&str; 5] = [
    "Context & Goals",
    "Requirements & Constraints",
    "Approach / Design",
    "Risks & Trade-offs",
    "References",
];

const WRITING_TIPS: [&str; 3] = [
    "Prefer examples drawn from the References.",
    "Adhere to any MUST/SHOULD rules found in rulesets.",
    "Keep scope tight; defer out-of-scope items.",
];

#[derive(Debug, Clone, Default)]
pub struct BriefRequest {
    pub task: String,
    pub audience: Option<String>,
    pub deliverable: Option<String>,
    pub tone: Option<String>,
    pub constraints: Vec<String>,
    pub filters: Filters,
    pub mode: SearchMode,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Guidance {
    pub suggested_outline: Vec<&'static str>,
    pub writing_tips: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub id: String,
    pub topic: String,
    pub document: String,
    pub section_path: Vec<String>,
    pub tags: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Brief {
    pub task: String,
    pub audience: Option<String>,
    pub deliverable: Option<String>,
    pub tone: Option<String>,
    pub constraints: Vec<String>,
    pub guidance: Guidance,
    pub references: Vec<Reference>,
}

pub async fn build_brief(
    store: &JsonlStore,
    embedder: &dyn Embedder,
    request: BriefRequest,
) -> Result<Brief> {
    let options = SearchOptions {
        filters: request.filters,
        mode: request.mode,
        limit: request
            .limit
            .unwrap_or(DEFAULT_BRIEF_LIMIT)
            .clamp(1, MAX_BRIEF_LIMIT),
        ..Default::default()
    };
    let page = search(store, embedder, &request.task, &options).await?;

    Ok(Brief {
        task: request.task,
        audience: request.audience,
        deliverable: request.deliverable,
        tone: request.tone,
        constraints: request.constraints,
        guidance: Guidance {
            suggested_outline: SUGGESTED_OUTLINE.to_vec(),
            writing_tips: WRITING_TIPS.to_vec(),
        },
        references: page
            .hits
            .into_iter()
            .map(|hit| Reference {
                id: hit.id,
                topic: hit.topic,
                document: hit.document,
                section_path: hit.section_path,
                tags: hit.tags,
                score: hit.score,
            })
            .collect(),
    })
}
