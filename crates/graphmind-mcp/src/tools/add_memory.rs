//! `add_memory` tool (spec.md §6)
//!
//! Accepts a single string or an array of strings and runs them through
//! `WritePipeline::process_batch` — even a single-item call goes through
//! the batch path so the drain-before-next-write invariant (spec.md §4.7)
//! is exercised uniformly.

use graphmind_core::write::{AddMemoryRequest, BatchOutcome, WritePipeline};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": {
                "description": "A single fact, or an array of facts to ingest sequentially",
                "oneOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            },
            "userId": {"type": "string"},
            "appName": {"type": "string", "default": "agent"},
            "tags": {"type": "array", "items": {"type": "string"}, "default": []}
        },
        "required": ["content", "userId"]
    })
}

#[derive(Debug, Deserialize)]
struct Content(#[serde(deserialize_with = "deserialize_content")] Vec<String>);

fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(s) => vec![s],
        Raw::Many(v) => v,
    })
}

#[derive(Debug, Deserialize)]
struct AddMemoryArgs {
    content: Content,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "appName", default = "default_app_name")]
    app_name: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_app_name() -> String {
    "agent".to_string()
}

fn event_name(outcome: &BatchOutcome) -> &'static str {
    match outcome {
        BatchOutcome::Add { .. } => "ADD",
        BatchOutcome::Supersede { .. } => "SUPERSEDE",
        BatchOutcome::SkipDuplicate { .. } => "SKIP_DUPLICATE",
        BatchOutcome::Error { .. } => "ERROR",
    }
}

fn outcome_to_json(text: &str, outcome: BatchOutcome) -> Value {
    let event = event_name(&outcome);
    match outcome {
        BatchOutcome::Add { id } => serde_json::json!({"id": id, "memory": text, "event": event}),
        BatchOutcome::Supersede { old_id, new_id } => {
            serde_json::json!({"id": new_id, "memory": text, "event": event, "oldId": old_id})
        }
        BatchOutcome::SkipDuplicate { existing_id } => {
            serde_json::json!({"id": existing_id, "memory": text, "event": event})
        }
        BatchOutcome::Error { message } => serde_json::json!({"id": Value::Null, "memory": text, "event": event, "error": message}),
    }
}

pub async fn execute(pipeline: &Arc<WritePipeline>, args: Option<Value>) -> Result<Value, String> {
    let args: AddMemoryArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("invalid arguments: {e}"))?,
        None => return Err("missing arguments".to_string()),
    };
    if args.content.0.is_empty() {
        return Err("content must not be empty".to_string());
    }

    let requests: Vec<AddMemoryRequest> = args
        .content
        .0
        .iter()
        .map(|text| AddMemoryRequest {
            text: text.clone(),
            user_id: args.user_id.clone(),
            app_name: args.app_name.clone(),
            tags: args.tags.clone(),
        })
        .collect();

    let outcomes = pipeline.process_batch(requests).await;
    let results: Vec<Value> = args.content.0.iter().zip(outcomes).map(|(text, outcome)| outcome_to_json(text, outcome)).collect();

    Ok(serde_json::json!({ "results": results }))
}
