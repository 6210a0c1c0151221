//! Entity extraction worker (C6)
//!
//! Given a Memory id: load text + up to 3 prior sibling memories for
//! co-reference context, call an LLM for structured entity/relationship
//! extraction, resolve each entity, and wire `MENTIONS`/`RELATED_TO`.
//! All LLM/parse failures are logged and swallowed — extraction must
//! never block the write (spec.md §4.5).

use crate::entity::{self, NewEntity};
use crate::graph::{params, GraphClient};
use crate::providers::embeddings::EmbeddingClient;
use crate::providers::llm::{parse_lenient_json, LlmClient, ParseResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const PRIOR_SIBLINGS: usize = 3;

#[derive(Debug, Deserialize, Default)]
struct ExtractedEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    description: String,
}

#[derive(Debug, Deserialize, Default)]
struct ExtractedRelationship {
    source: String,
    #[serde(rename = "type")]
    relation_type: String,
    target: String,
    description: String,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct ExtractionResponse {
    #[serde(default)]
    entities: Vec<ExtractedEntity>,
    #[serde(default)]
    relationships: Vec<ExtractedRelationship>,
}

async fn load_memory_text(graph: &dyn GraphClient, memory_id: &str) -> Option<(String, String)> {
    let rows = graph
        .run_read(
            "MATCH (u:User)-[:HAS_MEMORY]->(m:Memory {id: $id}) RETURN m.content AS content, u.userId AS userId",
            params([("id", Value::String(memory_id.to_string()))]),
        )
        .await
        .ok()?;
    let row = rows.into_iter().next()?;
    let content = row.get("content")?.as_str()?.to_string();
    let user_id = row.get("userId")?.as_str()?.to_string();
    Some((content, user_id))
}

async fn load_prior_siblings(graph: &dyn GraphClient, user_id: &str, memory_id: &str) -> Vec<String> {
    let rows = graph
        .run_read(
            "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory {id: $id}) \
             MATCH (u)-[:HAS_MEMORY]->(prior:Memory) \
             WHERE prior.createdAt < m.createdAt \
             RETURN prior.content AS content \
             ORDER BY prior.createdAt DESC \
             LIMIT toInteger($limit)",
            params([
                ("userId", Value::String(user_id.to_string())),
                ("id", Value::String(memory_id.to_string())),
                ("limit", Value::from(PRIOR_SIBLINGS as i64)),
            ]),
        )
        .await
        .unwrap_or_default();

    rows.into_iter().filter_map(|row| row.get("content").and_then(Value::as_str).map(str::to_string)).collect()
}

async fn extract(llm: &LlmClient, text: &str, prior: &[String]) -> ExtractionResponse {
    let system = "Extract entities and relationships from the user's statement. \
                  Use prior statements only for co-reference resolution (e.g. resolving \"she\"). \
                  Return JSON: {\"entities\":[{\"name\",\"type\",\"description\"}], \
                  \"relationships\":[{\"source\",\"type\",\"target\",\"description\",\"metadata\"}]}.";
    let mut user = String::new();
    if !prior.is_empty() {
        user.push_str("Prior statements:\n");
        for p in prior {
            user.push_str("- ");
            user.push_str(p);
            user.push('\n');
        }
    }
    user.push_str("Statement: ");
    user.push_str(text);

    match llm.chat(system, &user, true).await {
        Ok(response) => match parse_lenient_json::<ExtractionResponse>(&response) {
            ParseResult::Parsed(extracted) => extracted,
            ParseResult::Error(e) => {
                tracing::debug!(error = e.message, "extraction response failed to parse, treating as empty");
                ExtractionResponse::default()
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "extraction llm call failed, treating as empty");
            ExtractionResponse::default()
        }
    }
}

async fn link_mention(graph: &dyn GraphClient, memory_id: &str, entity_id: &str) {
    let result = graph
        .run_write(
            "MATCH (m:Memory {id: $memoryId}), (e:Entity {id: $entityId}) MERGE (m)-[:MENTIONS]->(e)",
            params([
                ("memoryId", Value::String(memory_id.to_string())),
                ("entityId", Value::String(entity_id.to_string())),
            ]),
        )
        .await;
    if let Err(e) = result {
        tracing::warn!(memory_id, entity_id, error = %e, "failed to write MENTIONS edge");
    }
}

async fn link_relationship(
    graph: &dyn GraphClient,
    source_id: &str,
    target_id: &str,
    relation_type: &str,
    description: &str,
    metadata: Option<&Value>,
) {
    let result = graph
        .run_write(
            "MATCH (src:Entity {id: $sourceId}), (tgt:Entity {id: $targetId}) \
             MERGE (src)-[r:RELATED_TO {type: $relationType}]->(tgt) \
             ON CREATE SET r.description = $description, r.metadata = $metadata, \
                           r.weight = 0.5, r.createdAt = datetime()",
            params([
                ("sourceId", Value::String(source_id.to_string())),
                ("targetId", Value::String(target_id.to_string())),
                ("relationType", Value::String(relation_type.to_string())),
                ("description", Value::String(description.to_string())),
                ("metadata", metadata.cloned().unwrap_or(Value::Null)),
            ]),
        )
        .await;
    if let Err(e) = result {
        tracing::warn!(source_id, target_id, error = %e, "failed to write RELATED_TO edge");
    }
}

/// Run entity extraction for one memory to completion. Intended to be
/// wrapped by [`crate::task::BackgroundTask::spawn`] from the write
/// pipeline; every internal failure is logged and swallowed.
pub async fn run(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, llm: &LlmClient, memory_id: String) {
    let Some((text, user_id)) = load_memory_text(graph, &memory_id).await else {
        tracing::warn!(memory_id, "extraction: memory not found, skipping");
        return;
    };

    let prior = load_prior_siblings(graph, &user_id, &memory_id).await;
    let extracted = extract(llm, &text, &prior).await;

    let mut resolved: HashMap<String, String> = HashMap::new();
    for entity in &extracted.entities {
        let new = NewEntity { name: &entity.name, entity_type: &entity.entity_type, description: &entity.description };
        match entity::resolve_entity(graph, embeddings, llm, &user_id, new).await {
            Ok(entity_id) => {
                link_mention(graph, &memory_id, &entity_id).await;
                resolved.insert(entity.name.clone(), entity_id);
            }
            Err(e) => tracing::warn!(memory_id, entity = entity.name, error = %e, "failed to resolve entity"),
        }
    }

    for rel in &extracted.relationships {
        let source_id = resolve_endpoint(graph, embeddings, llm, &user_id, &rel.source, &mut resolved).await;
        let target_id = resolve_endpoint(graph, embeddings, llm, &user_id, &rel.target, &mut resolved).await;
        if let (Some(source_id), Some(target_id)) = (source_id, target_id) {
            link_relationship(graph, &source_id, &target_id, &rel.relation_type, &rel.description, rel.metadata.as_ref()).await;
        }
    }
}

/// Relationship endpoints may reference an entity not present in the
/// same extraction's entity list; resolve it on demand with a generic
/// type/description rather than dropping the relationship.
async fn resolve_endpoint(
    graph: &dyn GraphClient,
    embeddings: &dyn EmbeddingClient,
    llm: &LlmClient,
    user_id: &str,
    name: &str,
    resolved: &mut HashMap<String, String>,
) -> Option<String> {
    if let Some(id) = resolved.get(name) {
        return Some(id.clone());
    }
    let new = NewEntity { name, entity_type: crate::model::EntityType::OTHER, description: name };
    match entity::resolve_entity(graph, embeddings, llm, user_id, new).await {
        Ok(id) => {
            resolved.insert(name.to_string(), id.clone());
            Some(id)
        }
        Err(e) => {
            tracing::warn!(name, error = %e, "failed to resolve relationship endpoint");
            None
        }
    }
}
