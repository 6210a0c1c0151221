//! `entity` tool (spec.md §6) — the one operation callers actually need
//! outside the write/search flow: explicit idempotent resolution, for
//! agents that want an entity id before referencing it elsewhere.

use graphmind_core::entity::{self, NewEntity};
use graphmind_core::graph::GraphClient;
use graphmind_core::providers::embeddings::EmbeddingClient;
use graphmind_core::providers::llm::LlmClient;
use serde::Deserialize;
use serde_json::Value;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "userId": {"type": "string"},
            "entityName": {"type": "string"},
            "entityType": {"type": "string", "default": "OTHER"},
            "description": {"type": "string", "default": ""}
        },
        "required": ["userId", "entityName"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityArgs {
    user_id: String,
    entity_name: String,
    #[serde(default = "default_entity_type")]
    entity_type: String,
    #[serde(default)]
    description: String,
}

fn default_entity_type() -> String {
    "OTHER".to_string()
}

pub async fn execute(graph: &dyn GraphClient, embeddings: &dyn EmbeddingClient, llm: &LlmClient, args: Option<Value>) -> Result<Value, String> {
    let args: EntityArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid arguments: {e}"))?,
        None => return Err("missing arguments".to_string()),
    };

    let new = NewEntity {
        name: &args.entity_name,
        entity_type: &args.entity_type,
        description: if args.description.is_empty() { &args.entity_name } else { &args.description },
    };
    let id = entity::resolve_entity(graph, embeddings, llm, &args.user_id, new).await.map_err(|e| e.to_string())?;

    Ok(serde_json::json!({ "entityId": id, "entityName": args.entity_name }))
}
