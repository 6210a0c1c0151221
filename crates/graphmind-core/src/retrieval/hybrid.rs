//! Hybrid retrieval (C8): BM25 arm + vector arm + Reciprocal Rank Fusion
//!
//! RRF math lifted near-verbatim from the teacher's `search::hybrid`
//! free-function implementation, generalized to the confidence and
//! normalized-score formulas spec.md §4.8 requires.

use crate::graph::{params, GraphClient, GraphError};
use crate::model::Memory;
use crate::providers::embeddings::EmbeddingClient;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

const RRF_K: f32 = 60.0;
/// `1 / (60 + 1)`, the RRF score of a single-arm top hit. Below
/// `CONFIDENCE_SCORE_FLOOR` by design: a lone vector hit with no text
/// match needs a genuinely strong score to count as confident, whereas
/// any text-arm hit is confident regardless of its RRF score.
const SINGLE_ARM_TOP_SCORE: f32 = 1.0 / (RRF_K + 1.0);
const CONFIDENCE_SCORE_FLOOR: f32 = 0.02;
const NORMALIZED_SCORE_DIVISOR: f32 = 0.032786;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridMode {
    Hybrid,
    Vector,
    Text,
}

#[derive(Debug, Clone)]
pub struct HybridResult {
    pub memory: Memory,
    pub categories: Vec<String>,
    pub text_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub rrf_score: f32,
    pub relevance_score: f32,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub confident: bool,
    pub results: Vec<HybridResult>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

struct ArmRow {
    memory: Memory,
    categories: Vec<String>,
    score: f32,
}

fn row_to_memory(row: &HashMap<String, Value>) -> Option<ArmRow> {
    let id = row.get("id")?.as_str()?.to_string();
    let content = row.get("content")?.as_str()?.to_string();
    let created_at = row.get("createdAt").and_then(parse_timestamp).unwrap_or_else(Utc::now);
    let categories = row
        .get("categories")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let score = row.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

    Some(ArmRow {
        memory: Memory {
            id,
            content,
            state: crate::model::MemoryState::Active,
            created_at,
            updated_at: created_at,
            valid_at: created_at,
            invalid_at: None,
            embedding: None,
        },
        categories,
        score,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

/// `embed(query)` then `vector_search.search("memory_vectors", topK, qv)`,
/// anchored to `User` and filtered to live memories.
async fn vector_arm(
    graph: &dyn GraphClient,
    user_id: &str,
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<ArmRow>, GraphError> {
    let query = "CALL db.index.vector.queryNodes('memory_vectors', $topK, $queryVector) \
                 YIELD node, score \
                 MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(node) \
                 WHERE node.state <> 'deleted' AND node.invalidAt IS NULL \
                 OPTIONAL MATCH (node)-[:HAS_CATEGORY]->(c:Category) \
                 WITH node, score, collect(c.name) AS categories \
                 RETURN node.id AS id, node.content AS content, node.createdAt AS createdAt, categories, score \
                 ORDER BY score DESC \
                 LIMIT toInteger($topK)";

    let rows = graph
        .run_read(
            query,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("queryVector", Value::Array(query_vector.iter().map(|f| Value::from(*f)).collect())),
                ("topK", Value::from(top_k as i64)),
            ]),
        )
        .await?;

    Ok(rows.iter().filter_map(row_to_memory).collect())
}

/// The store's built-in text search over all indexed fields
/// (`text_search.search_all` semantics — spec.md §9 leaves the
/// procedure's wire name a deployment detail; `db.index.fulltext`
/// is the idiomatic Neo4j equivalent).
async fn text_arm(graph: &dyn GraphClient, user_id: &str, query: &str, top_k: usize) -> Result<Vec<ArmRow>, GraphError> {
    let cypher = "CALL db.index.fulltext.queryNodes('memory_text', $query) \
                  YIELD node, score \
                  MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(node) \
                  WHERE node.state <> 'deleted' AND node.invalidAt IS NULL \
                  OPTIONAL MATCH (node)-[:HAS_CATEGORY]->(c:Category) \
                  WITH node, score, collect(c.name) AS categories \
                  RETURN node.id AS id, node.content AS content, node.createdAt AS createdAt, categories, score \
                  ORDER BY score DESC \
                  LIMIT toInteger($topK)";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("query", Value::String(query.to_string())),
                ("topK", Value::from(top_k as i64)),
            ]),
        )
        .await?;

    Ok(rows.iter().filter_map(row_to_memory).collect())
}

/// Reciprocal Rank Fusion: `score(d) = Σ 1/(K + rank(d))` across arms.
/// 1-based ranks, K = 60 — the top hit in an arm scores `1/(K + 1)`
/// (`SINGLE_ARM_TOP_SCORE`).
pub fn reciprocal_rank_fusion(text_ids: &[String], vector_ids: &[String], k: f32) -> HashMap<String, f32> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for (rank, id) in text_ids.iter().enumerate() {
        *scores.entry(id.clone()).or_default() += 1.0 / (k + rank as f32 + 1.0);
    }
    for (rank, id) in vector_ids.iter().enumerate() {
        *scores.entry(id.clone()).or_default() += 1.0 / (k + rank as f32 + 1.0);
    }
    scores
}

pub fn normalized_relevance_score(rrf_score: f32) -> f32 {
    (rrf_score / NORMALIZED_SCORE_DIVISOR).min(1.0)
}

/// `(any result has a text rank) || (max rrf score > 0.02)`. Empty
/// result sets are vacuously confident — there is nothing to misjudge.
pub fn is_confident(results: &[HybridResult]) -> bool {
    if results.is_empty() {
        return true;
    }
    results.iter().any(|r| r.text_rank.is_some()) || results.iter().map(|r| r.rrf_score).fold(0.0, f32::max) > CONFIDENCE_SCORE_FLOOR
}

pub async fn hybrid_search(
    graph: &dyn GraphClient,
    embeddings: &dyn EmbeddingClient,
    user_id: &str,
    query: &str,
    top_k: usize,
    mode: HybridMode,
    filters: SearchFilters,
) -> Result<SearchResponse, GraphError> {
    let source_limit = top_k * 2;

    let text_rows = if matches!(mode, HybridMode::Hybrid | HybridMode::Text) {
        text_arm(graph, user_id, query, source_limit).await?
    } else {
        Vec::new()
    };

    let vector_rows = if matches!(mode, HybridMode::Hybrid | HybridMode::Vector) {
        match embeddings.embed(query).await {
            Ok(vector) => vector_arm(graph, user_id, &vector, source_limit).await?,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, vector arm skipped");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let text_ids: Vec<String> = text_rows.iter().map(|r| r.memory.id.clone()).collect();
    let vector_ids: Vec<String> = vector_rows.iter().map(|r| r.memory.id.clone()).collect();
    let fused = reciprocal_rank_fusion(&text_ids, &vector_ids, RRF_K);

    let mut by_id: HashMap<String, ArmRow> = HashMap::new();
    for row in text_rows.into_iter().chain(vector_rows) {
        by_id.entry(row.memory.id.clone()).or_insert(row);
    }

    let mut results: Vec<HybridResult> = fused
        .into_iter()
        .filter_map(|(id, rrf_score)| {
            let row = by_id.remove(&id)?;
            let text_rank = text_ids.iter().position(|x| x == &id).map(|p| p + 1);
            let vector_rank = vector_ids.iter().position(|x| x == &id).map(|p| p + 1);
            Some(HybridResult {
                memory: row.memory,
                categories: row.categories,
                text_rank,
                vector_rank,
                rrf_score,
                relevance_score: normalized_relevance_score(rrf_score),
            })
        })
        .collect();

    if let Some(category) = &filters.category {
        let needle = category.to_lowercase();
        results.retain(|r| r.categories.iter().any(|c| c.to_lowercase() == needle));
    }
    if let Some(after) = filters.created_after {
        results.retain(|r| r.memory.created_at > after);
    }

    results.sort_by(|a, b| b.rrf_score.partial_cmp(&a.rrf_score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);

    let confident = is_confident(&results);
    Ok(SearchResponse { confident, results })
}

/// Recall a small candidate set for dedup (spec.md §4.3 step 3):
/// vector arm only, filtered to `score >= threshold`, preserving
/// cosine-descending order.
pub async fn recall_dedup_candidates(
    graph: &dyn GraphClient,
    query_vector: &[f32],
    user_id: &str,
    threshold: f32,
    top_k: usize,
) -> Result<Vec<crate::retrieval::CandidateMemory>, GraphError> {
    let rows = vector_arm(graph, user_id, query_vector, top_k).await?;
    Ok(rows
        .into_iter()
        .filter(|row| row.score >= threshold)
        .map(|row| crate::retrieval::CandidateMemory {
            id: row.memory.id,
            content: row.memory.content,
            score: row.score,
            categories: row.categories,
        })
        .collect())
}
