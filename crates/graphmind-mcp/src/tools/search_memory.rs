//! `search_memory` tool (spec.md §6) — search mode (query present) and
//! browse mode (query absent), dispatched from one schema the way the
//! teacher's `search_unified` tool folds several historical tools into
//! one entry point.

use chrono::{DateTime, Utc};
use graphmind_core::graph::GraphClient;
use graphmind_core::providers::embeddings::EmbeddingClient;
use graphmind_core::query::{self, ListOptions};
use graphmind_core::retrieval::{hybrid_search, HybridMode, SearchFilters};
use serde::Deserialize;
use serde_json::Value;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "userId": {"type": "string"},
            "query": {"type": "string", "description": "Omit for browse mode"},
            "limit": {"type": "integer", "default": 10, "minimum": 1, "maximum": 50},
            "offset": {"type": "integer", "default": 0, "minimum": 0, "description": "Browse mode only"},
            "category": {"type": "string"},
            "createdAfter": {"type": "string", "description": "RFC3339 timestamp, search mode only"}
        },
        "required": ["userId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    user_id: String,
    query: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    category: Option<String>,
    created_after: Option<String>,
}

fn default_limit() -> usize {
    10
}

pub async fn execute(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, args: Option<Value>) -> Result<Value, String> {
    let args: SearchArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid arguments: {e}"))?,
        None => return Err("missing arguments".to_string()),
    };
    let limit = args.limit.clamp(1, 50);

    match &args.query {
        Some(query) if !query.trim().is_empty() => search_mode(graph, embeddings, &args, query, limit).await,
        _ => browse_mode(graph, &args, limit).await,
    }
}

async fn search_mode(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, args: &SearchArgs, query: &str, limit: usize) -> Result<Value, String> {
    let created_after: Option<DateTime<Utc>> = args
        .created_after
        .as_deref()
        .map(|s| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| format!("invalid createdAfter: {e}"))?;

    let filters = SearchFilters { category: args.category.clone(), created_after };
    let response = hybrid_search(graph, embeddings, &args.user_id, query, limit, HybridMode::Hybrid, filters)
        .await
        .map_err(|e| e.to_string())?;

    let results: Vec<Value> = response
        .results
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.memory.id,
                "memory": r.memory.content,
                "relevance_score": r.relevance_score,
                "raw_score": r.rrf_score,
                "text_rank": r.text_rank,
                "vector_rank": r.vector_rank,
                "created_at": r.memory.created_at,
                "categories": r.categories,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "confident": response.confident,
        "message": if response.confident { "" } else { "low-confidence results; consider broadening the query" },
        "results": results,
    }))
}

async fn browse_mode(graph: &dyn GraphClient, args: &SearchArgs, limit: usize) -> Result<Value, String> {
    let opts = ListOptions { limit, offset: args.offset, category: args.category.clone(), include_superseded: false, as_of: None };
    let rows = query::list_memories(graph, &args.user_id, &opts).await.map_err(|e| e.to_string())?;
    let total = query::count_memories(graph, &args.user_id, false).await.map_err(|e| e.to_string())?;

    let results: Vec<Value> = rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "id": row.memory.id,
                "memory": row.memory.content,
                "created_at": row.memory.created_at,
                "updated_at": row.memory.updated_at,
                "categories": row.categories,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "total": total,
        "offset": args.offset,
        "limit": limit,
        "results": results,
    }))
}
