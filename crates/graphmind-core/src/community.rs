//! Community builder (C10)
//!
//! `rebuildClusters(userId)`: idempotent wholesale rebuild via the
//! store's community-detection procedure + LLM summarization. Skips
//! singletons; summarization failures fall back to generic defaults
//! (spec.md §4.10).

use crate::graph::{params, GraphClient, GraphError};
use crate::providers::llm::{parse_lenient_json, LlmClient, ParseResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const NOISE_FLOOR: i64 = 5;
const MIN_COMMUNITY_SIZE: usize = 2;
const SUMMARY_SAMPLE_SIZE: usize = 20;
const DEFAULT_RANK: u8 = 5;

#[derive(Debug, Deserialize, Default)]
struct SummaryResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    rank: Option<u8>,
    #[serde(default)]
    findings: Vec<String>,
}

struct Summary {
    name: String,
    summary: String,
    rank: u8,
    findings: Vec<String>,
}

async fn live_memory_count(graph: &dyn GraphClient, user_id: &str) -> Result<i64, GraphError> {
    let rows = graph
        .run_read(
            "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory) \
             WHERE m.state <> 'deleted' AND m.invalidAt IS NULL \
             RETURN count(m) AS n",
            params([("userId", Value::String(user_id.to_string()))]),
        )
        .await?;
    Ok(rows.into_iter().next().and_then(|row| row.get("n").and_then(Value::as_i64)).unwrap_or(0))
}

/// `(node, community_id)` pairs from the store's community-detection
/// procedure, filtered to this user's subgraph.
async fn detect_communities(graph: &dyn GraphClient, user_id: &str) -> Result<HashMap<String, Vec<String>>, GraphError> {
    let rows = graph
        .run_read(
            "CALL gds.louvain.stream({ \
                 nodeQuery: 'MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory) RETURN id(m) AS id', \
                 relationshipQuery: 'MATCH (:Memory)-[:MENTIONS]->(:Entity)<-[:MENTIONS]-(m2:Memory) RETURN id(m2) AS source, id(m2) AS target' \
             }) YIELD nodeId, communityId \
             MATCH (m:Memory) WHERE id(m) = nodeId \
             RETURN m.id AS memoryId, communityId",
            params([("userId", Value::String(user_id.to_string()))]),
        )
        .await?;

    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let Some(memory_id) = row.get("memoryId").and_then(Value::as_str) else {
            continue;
        };
        let community_id = row.get("communityId").and_then(Value::as_i64).map(|n| n.to_string()).unwrap_or_default();
        groups.entry(community_id).or_default().push(memory_id.to_string());
    }
    Ok(groups)
}

async fn delete_existing_communities(graph: &dyn GraphClient, user_id: &str) -> Result<(), GraphError> {
    graph
        .run_write(
            "MATCH (u:User {userId: $userId})-[:HAS_COMMUNITY]->(c:Community) DETACH DELETE c",
            params([("userId", Value::String(user_id.to_string()))]),
        )
        .await?;
    Ok(())
}

async fn fetch_member_texts(graph: &dyn GraphClient, member_ids: &[String]) -> Result<Vec<String>, GraphError> {
    let rows = graph
        .run_read(
            "MATCH (m:Memory) WHERE m.id IN $ids RETURN m.content AS content LIMIT toInteger($limit)",
            params([
                ("ids", Value::Array(member_ids.iter().map(|s| Value::String(s.clone())).collect())),
                ("limit", Value::from(SUMMARY_SAMPLE_SIZE as i64)),
            ]),
        )
        .await?;
    Ok(rows.into_iter().filter_map(|row| row.get("content").and_then(Value::as_str).map(str::to_string)).collect())
}

fn default_summary() -> Summary {
    Summary {
        name: "Unnamed cluster".to_string(),
        summary: "No summary available.".to_string(),
        rank: DEFAULT_RANK,
        findings: Vec::new(),
    }
}

async fn summarize(llm: &LlmClient, texts: &[String]) -> Summary {
    if texts.is_empty() {
        return default_summary();
    }
    let system = "Summarize this cluster of related memories about a single user. \
                  Return JSON: {\"name\", \"summary\", \"rank\" (1-10), \"findings\": [string]}.";
    let user = texts.join("\n- ");

    match llm.chat(system, &user, true).await {
        Ok(response) => match parse_lenient_json::<SummaryResponse>(&response) {
            ParseResult::Parsed(parsed) => Summary {
                name: parsed.name.unwrap_or_else(|| "Unnamed cluster".to_string()),
                summary: parsed.summary.unwrap_or_else(|| "No summary available.".to_string()),
                rank: parsed.rank.map(|r| r.clamp(1, 10)).unwrap_or(DEFAULT_RANK),
                findings: parsed.findings,
            },
            ParseResult::Error(_) => default_summary(),
        },
        Err(_) => default_summary(),
    }
}

async fn create_community(graph: &dyn GraphClient, user_id: &str, summary: &Summary, member_ids: &[String]) -> Result<(), GraphError> {
    graph
        .run_write(
            "MATCH (u:User {userId: $userId}) \
             CREATE (c:Community {id: randomUUID(), name: $name, summary: $summary, \
                                   rank: $rank, findings: $findings, memberCount: $memberCount, \
                                   createdAt: datetime(), updatedAt: datetime()}) \
             MERGE (u)-[:HAS_COMMUNITY]->(c) \
             WITH c \
             UNWIND $memberIds AS memberId \
             MATCH (m:Memory {id: memberId}) \
             MERGE (m)-[:IN_COMMUNITY]->(c)",
            params([
                ("userId", Value::String(user_id.to_string())),
                ("name", Value::String(summary.name.clone())),
                ("summary", Value::String(summary.summary.clone())),
                ("rank", Value::from(summary.rank as i64)),
                ("findings", Value::Array(summary.findings.iter().cloned().map(Value::String).collect())),
                ("memberCount", Value::from(member_ids.len() as i64)),
                ("memberIds", Value::Array(member_ids.iter().cloned().map(Value::String).collect())),
            ]),
        )
        .await?;
    Ok(())
}

/// Idempotent wholesale rebuild. Noise floor at < 5 live memories; an
/// empty detection result leaves prior communities untouched
/// (spec.md §9 leaves this undecided in the source — treating the
/// detector's silence as "nothing changed" rather than "clear
/// everything" matches the early-return already specified for the
/// zero-groups case).
pub async fn rebuild_clusters(graph: &dyn GraphClient, llm: &LlmClient, user_id: &str) -> Result<(), GraphError> {
    if live_memory_count(graph, user_id).await? < NOISE_FLOOR {
        return Ok(());
    }

    let groups = detect_communities(graph, user_id).await?;
    if groups.is_empty() {
        return Ok(());
    }

    delete_existing_communities(graph, user_id).await?;

    for member_ids in groups.values() {
        if member_ids.len() < MIN_COMMUNITY_SIZE {
            continue;
        }
        let texts = fetch_member_texts(graph, member_ids).await?;
        let summary = summarize(llm, &texts).await;
        create_community(graph, user_id, &summary, member_ids).await?;
    }

    Ok(())
}
