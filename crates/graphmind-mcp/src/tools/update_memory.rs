//! `update_memory` tool (spec.md §6) — resolve the target memory by id
//! or content fragment, then supersede it through the write pipeline so
//! the old record keeps its bi-temporal history (spec.md §4.7).

use graphmind_core::query;
use graphmind_core::write::WritePipeline;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memoryId": {"type": "string"},
            "contentFragment": {"type": "string", "description": "Used to find the memory when memoryId is absent"},
            "text": {"type": "string", "description": "New content"},
            "userId": {"type": "string"},
            "appName": {"type": "string", "default": "agent"}
        },
        "required": ["text", "userId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMemoryArgs {
    memory_id: Option<String>,
    content_fragment: Option<String>,
    text: String,
    user_id: String,
    #[serde(default = "default_app_name")]
    app_name: String,
}

fn default_app_name() -> String {
    "agent".to_string()
}

pub async fn execute(pipeline: &Arc<WritePipeline>, graph: &dyn graphmind_core::graph::GraphClient, args: Option<Value>) -> Result<Value, String> {
    let args: UpdateMemoryArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid arguments: {e}"))?,
        None => return Err("missing arguments".to_string()),
    };
    if args.memory_id.is_none() && args.content_fragment.is_none() {
        return Err("one of memoryId or contentFragment is required".to_string());
    }

    let existing = query::find_memory(graph, &args.user_id, args.memory_id.as_deref(), args.content_fragment.as_deref())
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "memory not found".to_string())?;

    // The background extraction task is left to run fire-and-forget;
    // there is no follow-up write in this call to drain ahead of.
    let (new_id, _task) = pipeline
        .supersede_memory(&existing.memory.id, &args.text, &args.user_id, &args.app_name)
        .await
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "updated": {
            "old_id": existing.memory.id,
            "new_id": new_id,
            "old_content": existing.memory.content,
            "new_content": args.text,
        }
    }))
}
