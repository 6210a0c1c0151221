//! Graph DB adapter (C1)
//!
//! Exposes exactly two operations — `run_read` and `run_write` — over a
//! Cypher-speaking store with a vector index, a text index, and a
//! community-detection procedure (spec.md §6). Every other component
//! builds Cypher query strings itself and pushes traversal into the
//! store rather than hydrating the graph in-process (spec.md §9).

mod bootstrap;
mod neo4j;

pub use bootstrap::{ensure_schema, ensure_vector_indexes};
pub use neo4j::Neo4jClient;

use std::collections::HashMap;

/// Bound query parameters.
pub type Params = HashMap<String, serde_json::Value>;

/// One result row, keyed by the Cypher `RETURN` aliases.
pub type Row = HashMap<String, serde_json::Value>;

pub fn params(pairs: impl IntoIterator<Item = (&'static str, serde_json::Value)>) -> Params {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("transient index writer conflict: {0}")]
    TransientIndexConflict(String),
    #[error("graph driver unavailable: {0}")]
    DriverUnavailable(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl GraphError {
    /// Text-index writer contention surfaces through driver error
    /// messages rather than a typed variant — sniff the common
    /// substrings the way schema bootstrap sniffs "already exists".
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::TransientIndexConflict(_) => true,
            GraphError::Query(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("deadlock") || lower.contains("lock") || lower.contains("busy")
            }
            GraphError::DriverUnavailable(_) => false,
        }
    }
}

/// The adapter contract every higher component depends on.
#[async_trait::async_trait]
pub trait GraphClient: Send + Sync {
    async fn run_read(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError>;
    async fn run_write(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError>;
}

/// Run a write with bounded retry + exponential backoff on transient
/// text-index writer conflicts (spec.md §4.1, §5).
pub async fn run_write_with_retry(
    client: &dyn GraphClient,
    query: &str,
    params: Params,
    max_attempts: u32,
) -> Result<Vec<Row>, GraphError> {
    let mut attempt = 0;
    loop {
        match client.run_write(query, params.clone()).await {
            Ok(rows) => return Ok(rows),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let backoff_ms = 50u64 * 2u64.pow(attempt);
                tracing::warn!(attempt, backoff_ms, error = %e, "retrying transient graph write");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Normalize driver integer values that arrive as `{low, high}` structs
/// (the shape some Cypher HTTP gateways use for 64-bit integers) into a
/// plain JSON number. Values that are already plain numbers pass
/// through unchanged.
pub fn normalize_integer(value: &serde_json::Value) -> serde_json::Value {
    if let Some(obj) = value.as_object() {
        if let (Some(low), Some(high)) = (obj.get("low"), obj.get("high")) {
            if let (Some(low), Some(high)) = (low.as_i64(), high.as_i64()) {
                let combined = ((high as i64) << 32) | (low as i64 & 0xFFFF_FFFF);
                return serde_json::json!(combined);
            }
        }
    }
    value.clone()
}
