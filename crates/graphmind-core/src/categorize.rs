//! Categorization (subcomponent of C7, spec.md §4.6)
//!
//! LLM returns 1-3 free-form category labels per memory; a single
//! UNWIND-style write MERGEs each `Category` and creates
//! `HAS_CATEGORY` edges. All failures are swallowed — categorization
//! must never block the write.

use crate::graph::{params, GraphClient};
use crate::model::Category;
use crate::providers::llm::{parse_lenient_json, LlmClient, ParseResult};
use serde::Deserialize;
use serde_json::Value;

const SEED_HINT: &str = "health, finance, work, relationships, travel, hobbies, goals, preferences";

#[derive(Debug, Deserialize)]
struct CategoryResponse(Vec<String>);

/// Trim, reject > 50 chars, dedupe case-insensitively, cap at 3.
fn sanitize(labels: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for label in labels {
        let trimmed = label.trim();
        if trimmed.is_empty() || trimmed.len() > Category::MAX_LEN {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
        if out.len() == Category::MAX_PER_MEMORY {
            break;
        }
    }
    out
}

async fn categorize_via_llm(llm: &LlmClient, text: &str) -> Vec<String> {
    let system = format!(
        "Assign 1 to 3 short category labels to the user's statement. \
         Common categories include: {SEED_HINT}, but invent a more specific one if it fits better. \
         Return only a JSON array of strings."
    );
    match llm.chat(&system, text, true).await {
        Ok(response) => match parse_lenient_json::<CategoryResponse>(&response) {
            ParseResult::Parsed(categories) => categories.0,
            ParseResult::Error(_) => Vec::new(),
        },
        Err(_) => Vec::new(),
    }
}

pub async fn categorize_memory(graph: &dyn GraphClient, llm: &LlmClient, memory_id: &str, text: &str) {
    let labels = sanitize(categorize_via_llm(llm, text).await);
    if labels.is_empty() {
        return;
    }

    let cypher = "MATCH (m:Memory {id: $memoryId}) \
                  UNWIND $labels AS label \
                  MERGE (c:Category {name: label}) \
                  MERGE (m)-[:HAS_CATEGORY]->(c)";

    let result = graph
        .run_write(
            cypher,
            params([
                ("memoryId", Value::String(memory_id.to_string())),
                ("labels", Value::Array(labels.into_iter().map(Value::String).collect())),
            ]),
        )
        .await;

    if let Err(e) = result {
        tracing::warn!(memory_id, error = %e, "failed to write categories");
    }
}
