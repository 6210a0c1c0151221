//! Entity resolver (C5)
//!
//! `resolveEntity({name, type, description}, userId) -> entityId`.
//! Idempotent and race-safe: exact match, PERSON alias match, semantic
//! match, then an atomic MERGE create. Correctness of "same entity =>
//! same id" relies entirely on the MERGE returning the pre-existing
//! node to the loser of a race (spec.md §4.4 step 5) — no in-process
//! lock guards this.

use crate::graph::{params, GraphClient, GraphError};
use crate::model::{Entity, EntityType};
use crate::providers::embeddings::EmbeddingClient;
use crate::providers::llm::{parse_lenient_json, LlmClient, ParseResult};
use serde::Deserialize;
use serde_json::Value;

const SEMANTIC_MATCH_FLOOR: f32 = 0.3;
const SEMANTIC_MATCH_TOP_K: usize = 5;

pub struct NewEntity<'a> {
    pub name: &'a str,
    pub entity_type: &'a str,
    pub description: &'a str,
}

async fn ensure_user(graph: &dyn GraphClient, user_id: &str) -> Result<(), GraphError> {
    graph
        .run_write(
            "MERGE (u:User {userId: $userId}) ON CREATE SET u.createdAt = datetime()",
            params([("userId", Value::String(user_id.to_string()))]),
        )
        .await?;
    Ok(())
}

async fn exact_match(graph: &dyn GraphClient, user_id: &str, normalized_name: &str) -> Result<Option<String>, GraphError> {
    let rows = graph
        .run_read(
            "MATCH (u:User {userId: $userId})-[:HAS_ENTITY]->(e:Entity {normalizedName: $normalizedName}) \
             RETURN e.id AS id",
            params([
                ("userId", Value::String(user_id.to_string())),
                ("normalizedName", Value::String(normalized_name.to_string())),
            ]),
        )
        .await?;
    Ok(rows.into_iter().next().and_then(|row| row.get("id").and_then(Value::as_str).map(str::to_string)))
}

/// PERSON-only alias match: stored name is a prefix of the incoming
/// name or vice versa. Upgrades the stored display name if the
/// incoming one is strictly longer.
async fn alias_match(graph: &dyn GraphClient, user_id: &str, normalized_name: &str, display_name: &str) -> Result<Option<String>, GraphError> {
    let rows = graph
        .run_read(
            "MATCH (u:User {userId: $userId})-[:HAS_ENTITY]->(e:Entity {type: 'PERSON'}) \
             WHERE e.normalizedName STARTS WITH $normalizedName OR $normalizedName STARTS WITH e.normalizedName \
             RETURN e.id AS id, e.name AS name, e.normalizedName AS normalizedName \
             LIMIT 1",
            params([
                ("userId", Value::String(user_id.to_string())),
                ("normalizedName", Value::String(normalized_name.to_string())),
            ]),
        )
        .await?;

    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    let id = row.get("id").and_then(Value::as_str).map(str::to_string);
    let Some(id) = id else {
        return Ok(None);
    };

    let stored_name = row.get("name").and_then(Value::as_str).unwrap_or_default();
    if display_name.len() > stored_name.len() {
        graph
            .run_write(
                "MATCH (e:Entity {id: $id}) SET e.name = $name",
                params([("id", Value::String(id.clone())), ("name", Value::String(display_name.to_string()))]),
            )
            .await?;
    }

    Ok(Some(id))
}

#[derive(Debug, Deserialize)]
struct SameEntityResponse {
    same: bool,
}

async fn ask_same_entity(llm: &LlmClient, a_name: &str, a_desc: &str, b_name: &str, b_desc: &str) -> bool {
    let system = "Decide whether two entity records describe the same real-world entity. \
                  Respond with JSON: {\"same\": true} or {\"same\": false}.";
    let user = format!("Entity A: {a_name} — {a_desc}\nEntity B: {b_name} — {b_desc}");
    match llm.chat(system, &user, true).await {
        Ok(text) => match parse_lenient_json::<SameEntityResponse>(&text) {
            ParseResult::Parsed(resp) => resp.same,
            ParseResult::Error(_) => false,
        },
        Err(_) => false,
    }
}

/// Compute `embed(description)`; run vector search on `entity_vectors`
/// with a similarity floor and small K, then ask an LLM boolean pair
/// question per candidate until the first `true`. Any failure here is
/// silent — the caller falls through to creation.
async fn semantic_match(
    graph: &dyn GraphClient,
    embeddings: &dyn EmbeddingClient,
    llm: &LlmClient,
    user_id: &str,
    new: &NewEntity<'_>,
) -> Option<String> {
    let vector = embeddings.embed(new.description).await.ok()?;

    let cypher = "CALL db.index.vector.queryNodes('entity_vectors', $topK, $queryVector) \
                  YIELD node, score \
                  MATCH (u:User {userId: $userId})-[:HAS_ENTITY]->(node) \
                  WHERE score >= $floor \
                  RETURN node.id AS id, node.name AS name, node.description AS description \
                  ORDER BY score DESC";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("queryVector", Value::Array(vector.iter().map(|f| Value::from(*f)).collect())),
                ("topK", Value::from(SEMANTIC_MATCH_TOP_K as i64)),
                ("floor", Value::from(SEMANTIC_MATCH_FLOOR)),
            ]),
        )
        .await
        .ok()?;

    for row in rows {
        let id = row.get("id")?.as_str()?.to_string();
        let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
        let description = row.get("description").and_then(Value::as_str).unwrap_or_default();
        if ask_same_entity(llm, new.name, new.description, name, description).await {
            return Some(id);
        }
    }
    None
}

/// Single Cypher MERGE, atomic and race-safe: a concurrent writer's
/// existing node is returned to the loser of the race.
async fn create_or_merge(graph: &dyn GraphClient, user_id: &str, new: &NewEntity<'_>, normalized_name: &str) -> Result<String, GraphError> {
    let rows = graph
        .run_write(
            "MATCH (u:User {userId: $userId}) \
             MERGE (u)-[:HAS_ENTITY]->(e:Entity {normalizedName: $normalizedName}) \
             ON CREATE SET e.id = randomUUID(), e.name = $name, e.type = $type, \
                           e.description = $description, e.rank = 0.0, \
                           e.createdAt = datetime(), e.updatedAt = datetime() \
             RETURN e.id AS id",
            params([
                ("userId", Value::String(user_id.to_string())),
                ("normalizedName", Value::String(normalized_name.to_string())),
                ("name", Value::String(new.name.to_string())),
                ("type", Value::String(new.entity_type.to_uppercase())),
                ("description", Value::String(new.description.to_string())),
            ]),
        )
        .await?;

    rows.into_iter()
        .next()
        .and_then(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| GraphError::Query("entity MERGE returned no id".into()))
}

/// Type priority `PERSON > ORGANIZATION > LOCATION > PRODUCT > CONCEPT > OTHER`,
/// open-ontology labels ranked above `CONCEPT`/`OTHER`. Upgrades iff
/// the incoming type's priority is strictly higher; description
/// upgrades iff the new one is strictly longer.
async fn apply_upgrades(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, entity_id: &str, new: &NewEntity<'_>) -> Result<(), GraphError> {
    let rows = graph
        .run_read(
            "MATCH (e:Entity {id: $id}) RETURN e.type AS type, e.description AS description",
            params([("id", Value::String(entity_id.to_string()))]),
        )
        .await?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(());
    };
    let stored_type = row.get("type").and_then(Value::as_str).unwrap_or_default();
    let stored_description = row.get("description").and_then(Value::as_str).unwrap_or_default();

    let incoming_type = EntityType::new(new.entity_type);
    let mut set_clauses = Vec::new();
    let mut write_params = vec![("id", Value::String(entity_id.to_string()))];

    if incoming_type.priority() > EntityType::new(stored_type).priority() {
        set_clauses.push("e.type = $type");
        write_params.push(("type", Value::String(incoming_type.0)));
    }
    let description_upgraded = new.description.len() > stored_description.len();
    if description_upgraded {
        set_clauses.push("e.description = $description");
        write_params.push(("description", Value::String(new.description.to_string())));
    }

    if set_clauses.is_empty() {
        return Ok(());
    }
    set_clauses.push("e.updatedAt = datetime()");
    let cypher = format!("MATCH (e:Entity {{id: $id}}) SET {}", set_clauses.join(", "));
    graph.run_write(&cypher, params(write_params)).await?;

    if description_upgraded {
        persist_description_embedding(graph, embeddings, entity_id, new.description).await;
    }
    Ok(())
}

/// Fire-and-forget description embedding persistence; failures are
/// logged, never surfaced (spec.md §4.4).
pub async fn persist_description_embedding(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, entity_id: &str, description: &str) {
    match embeddings.embed(description).await {
        Ok(vector) => {
            let result = graph
                .run_write(
                    "MATCH (e:Entity {id: $id}) SET e.descriptionEmbedding = $embedding",
                    params([
                        ("id", Value::String(entity_id.to_string())),
                        ("embedding", Value::Array(vector.iter().map(|f| Value::from(*f)).collect())),
                    ]),
                )
                .await;
            if let Err(e) = result {
                tracing::warn!(entity_id, error = %e, "failed to persist description embedding");
            }
        }
        Err(e) => tracing::warn!(entity_id, error = %e, "failed to embed entity description"),
    }
}

pub async fn resolve_entity(
    graph: &dyn GraphClient,
    embeddings: &dyn EmbeddingClient,
    llm: &LlmClient,
    user_id: &str,
    new: NewEntity<'_>,
) -> Result<String, GraphError> {
    ensure_user(graph, user_id).await?;
    let normalized_name = Entity::normalize_name(new.name);

    if let Some(id) = exact_match(graph, user_id, &normalized_name).await? {
        apply_upgrades(graph, embeddings, &id, &new).await?;
        return Ok(id);
    }

    if new.entity_type.eq_ignore_ascii_case(EntityType::PERSON) {
        if let Some(id) = alias_match(graph, user_id, &normalized_name, new.name).await? {
            apply_upgrades(graph, embeddings, &id, &new).await?;
            return Ok(id);
        }
    }

    if let Some(id) = semantic_match(graph, embeddings, llm, user_id, &new).await {
        apply_upgrades(graph, embeddings, &id, &new).await?;
        return Ok(id);
    }

    let id = create_or_merge(graph, user_id, &new, &normalized_name).await?;
    persist_description_embedding(graph, embeddings, &id, new.description).await;
    Ok(id)
}
