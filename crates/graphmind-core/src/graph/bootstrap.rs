//! Idempotent schema bootstrap (spec.md §4.1)
//!
//! Ensures the uniqueness constraint, the two vector indexes, and the
//! text index exist. Errors whose message contains "already exists",
//! "violates", or "experimental" are swallowed; anything else is
//! fatal. A process-wide repair pass (`ensure_vector_indexes`) re-checks
//! the indexes once and caches success, mirroring the `OnceLock`
//! one-time-init pattern the teacher uses for its embedding model.

use super::{GraphClient, GraphError, Params};
use std::sync::OnceLock;

const SUPPRESSED_SUBSTRINGS: [&str; 3] = ["already exists", "violates", "experimental"];

fn is_suppressed(err: &GraphError) -> bool {
    let msg = err.to_string().to_lowercase();
    SUPPRESSED_SUBSTRINGS.iter().any(|needle| msg.contains(needle))
}

async fn run_idempotent(client: &dyn GraphClient, query: &str) -> Result<(), GraphError> {
    match client.run_write(query, Params::new()).await {
        Ok(_) => Ok(()),
        Err(e) if is_suppressed(&e) => {
            tracing::debug!(query, "schema statement already applied, skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Ensure the uniqueness constraint, vector indexes, and text index
/// exist. Safe to call on every startup.
pub async fn ensure_schema(client: &dyn GraphClient) -> Result<(), GraphError> {
    run_idempotent(
        client,
        "CREATE CONSTRAINT user_id_unique IF NOT EXISTS \
         FOR (u:User) REQUIRE u.userId IS UNIQUE",
    )
    .await?;

    run_idempotent(
        client,
        "CALL db.index.vector.createNodeIndex( \
            'memory_vectors', 'Memory', 'embedding', 1536, 'cosine')",
    )
    .await?;

    run_idempotent(
        client,
        "CALL db.index.vector.createNodeIndex( \
            'entity_vectors', 'Entity', 'descriptionEmbedding', 1536, 'cosine')",
    )
    .await?;

    run_idempotent(
        client,
        "CREATE FULLTEXT INDEX memory_text IF NOT EXISTS \
         FOR (m:Memory) ON EACH [m.content]",
    )
    .await?;

    Ok(())
}

static VECTOR_INDEX_REPAIR_DONE: OnceLock<()> = OnceLock::new();

/// Query the store for existing indexes and recreate any of
/// `memory_vectors` / `entity_vectors` that are missing. Caches success
/// once per process so a hot retrieval path never re-checks.
pub async fn ensure_vector_indexes(client: &dyn GraphClient) -> Result<(), GraphError> {
    if VECTOR_INDEX_REPAIR_DONE.get().is_some() {
        return Ok(());
    }

    let rows = client
        .run_read("SHOW VECTOR INDEXES YIELD name", Params::new())
        .await?;
    let existing: std::collections::HashSet<String> = rows
        .into_iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect();

    if !existing.contains("memory_vectors") {
        run_idempotent(
            client,
            "CALL db.index.vector.createNodeIndex( \
                'memory_vectors', 'Memory', 'embedding', 1536, 'cosine')",
        )
        .await?;
    }
    if !existing.contains("entity_vectors") {
        run_idempotent(
            client,
            "CALL db.index.vector.createNodeIndex( \
                'entity_vectors', 'Entity', 'descriptionEmbedding', 1536, 'cosine')",
        )
        .await?;
    }

    let _ = VECTOR_INDEX_REPAIR_DONE.set(());
    Ok(())
}
