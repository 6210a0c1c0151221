//! Deduplication engine (C4)
//!
//! `checkDeduplication(newText, userId, tags?) -> { action, existingId? }`.
//! Candidate recall → tag boost → top-1 LLM verify (cached) → runner-up
//! verify → negation safety gate → outcome mapping.

mod negation;

use crate::cache::PairCache;
use crate::config::{Config, DedupThresholds, EmbeddingProvider};
use crate::graph::GraphError;
use crate::providers::embeddings::EmbeddingClient;
use crate::providers::llm::{parse_lenient_json, LlmClient, ParseResult};
use crate::retrieval::hybrid::recall_dedup_candidates;
use crate::retrieval::CandidateMemory;
use serde::Deserialize;

const RUNNER_UP_SCORE_GAP: f32 = 0.05;
const CANDIDATE_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Duplicate,
    Supersedes,
    Different,
}

impl Verdict {
    fn from_label(label: &str) -> Self {
        match label.to_uppercase().as_str() {
            "DUPLICATE" => Verdict::Duplicate,
            "SUPERSEDES" => Verdict::Supersedes,
            _ => Verdict::Different,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupAction {
    Insert,
    Skip { existing_id: String },
    Supersede { existing_id: String },
}

#[derive(Debug, Deserialize)]
struct PairVerdictResponse {
    verdict: String,
}

/// Pair-classify `new_text` against `existing_text`. A classifier
/// failure fails open to `Different` (caller maps that to `insert`).
async fn classify_pair(llm: &LlmClient, new_text: &str, existing_text: &str) -> Verdict {
    let system = "Compare two memory statements about the same user. Decide if the second \
                  statement is a DUPLICATE of the first (same fact, no new information), \
                  SUPERSEDES it (an updated or contradicting version of the same fact), or is \
                  DIFFERENT (an unrelated fact). Respond with JSON: {\"verdict\": \"DUPLICATE\"} \
                  or {\"verdict\": \"SUPERSEDES\"} or {\"verdict\": \"DIFFERENT\"}.";
    let user = format!("Existing: {existing_text}\nNew: {new_text}");

    match llm.chat(system, &user, true).await {
        Ok(text) => match parse_lenient_json::<PairVerdictResponse>(&text) {
            ParseResult::Parsed(resp) => Verdict::from_label(&resp.verdict),
            ParseResult::Error(_) => Verdict::Different,
        },
        Err(_) => Verdict::Different,
    }
}

async fn cached_classify(cache: &PairCache, llm: &LlmClient, new_text: &str, existing_text: &str) -> Verdict {
    if let Some(cached) = cache.get(new_text, existing_text) {
        return cached;
    }
    let verdict = classify_pair(llm, new_text, existing_text).await;
    cache.put(new_text, existing_text, verdict);
    verdict
}

/// Stably partition candidates into {shares >= 1 tag with `tags`
/// (case-insensitive)} before {does not}, preserving cosine order
/// within each partition.
fn tag_boost(candidates: Vec<CandidateMemory>, tags: &[String]) -> Vec<CandidateMemory> {
    if tags.is_empty() || candidates.len() <= 1 {
        return candidates;
    }
    let wanted: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let (matching, rest): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
        c.categories.iter().any(|cat| wanted.contains(&cat.to_lowercase()))
    });
    matching.into_iter().chain(rest).collect()
}

fn outcome_to_action(verdict: Verdict, candidate_id: &str, new_text: &str, existing_text: &str) -> DedupAction {
    match verdict {
        Verdict::Duplicate => {
            if negation::exactly_one_negates(new_text, existing_text) {
                DedupAction::Insert
            } else {
                DedupAction::Skip { existing_id: candidate_id.to_string() }
            }
        }
        Verdict::Supersedes => DedupAction::Supersede { existing_id: candidate_id.to_string() },
        Verdict::Different => DedupAction::Insert,
    }
}

pub async fn check_deduplication(
    graph: &dyn crate::graph::GraphClient,
    embeddings: &dyn EmbeddingClient,
    llm: &LlmClient,
    cache: &PairCache,
    config: &Config,
    new_text: &str,
    user_id: &str,
    tags: &[String],
) -> Result<DedupAction, GraphError> {
    if !config.dedup_enabled {
        return Ok(DedupAction::Insert);
    }

    let threshold = active_threshold(&config.dedup_thresholds, config.embedding_provider);

    let query_vector = match embeddings.embed(new_text).await {
        Ok(v) => v,
        Err(_) => return Ok(DedupAction::Insert),
    };

    let mut candidates = recall_dedup_candidates(graph, &query_vector, user_id, threshold, CANDIDATE_TOP_K).await?;
    if candidates.is_empty() {
        return Ok(DedupAction::Insert);
    }

    candidates = tag_boost(candidates, tags);

    let top = &candidates[0];
    let top_verdict = cached_classify(cache, llm, new_text, &top.content).await;

    if top_verdict == Verdict::Different {
        if let Some(runner_up) = candidates.get(1) {
            if (top.score - runner_up.score).abs() < RUNNER_UP_SCORE_GAP {
                let runner_verdict = cached_classify(cache, llm, new_text, &runner_up.content).await;
                if matches!(runner_verdict, Verdict::Duplicate | Verdict::Supersedes) {
                    return Ok(outcome_to_action(runner_verdict, &runner_up.id, new_text, &runner_up.content));
                }
            }
        }
    }

    Ok(outcome_to_action(top_verdict, &top.id, new_text, &top.content))
}

/// The active provider's threshold, looked up verbatim — independence
/// across providers is a property of [`DedupThresholds`]' shape, not of
/// this lookup.
fn active_threshold(thresholds: &DedupThresholds, provider: EmbeddingProvider) -> f32 {
    thresholds.for_provider(provider)
}
