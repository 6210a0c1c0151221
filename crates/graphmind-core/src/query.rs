//! Memory listing and lookup (supports C11's browse mode and the
//! bi-temporal testable properties of spec.md §8).
//!
//! Nothing here writes; all three operations are plain `run_read`
//! Cypher anchored through `User`, matching the per-user isolation
//! invariant the rest of the core enforces (spec.md §9).

use crate::graph::{params, GraphClient, GraphError};
use crate::model::{Memory, MemoryState};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub struct MemoryRow {
    pub memory: Memory,
    pub categories: Vec<String>,
}

fn row_to_memory_row(row: &std::collections::HashMap<String, Value>) -> Option<MemoryRow> {
    let id = row.get("id")?.as_str()?.to_string();
    let content = row.get("content")?.as_str()?.to_string();
    let state = match row.get("state").and_then(Value::as_str) {
        Some("deleted") => MemoryState::Deleted,
        Some("archived") => MemoryState::Archived,
        _ => MemoryState::Active,
    };
    let created_at = parse_timestamp(row.get("createdAt")).unwrap_or_else(Utc::now);
    let updated_at = parse_timestamp(row.get("updatedAt")).unwrap_or(created_at);
    let valid_at = parse_timestamp(row.get("validAt")).unwrap_or(created_at);
    let invalid_at = row.get("invalidAt").and_then(parse_timestamp);
    let categories = row
        .get("categories")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Some(MemoryRow {
        memory: Memory { id, content, state, created_at, updated_at, valid_at, invalid_at, embedding: None },
        categories,
    })
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value?.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub category: Option<String>,
    pub include_superseded: bool,
    pub as_of: Option<DateTime<Utc>>,
}

/// Browse mode (spec.md §6): paginated listing, newest first. With
/// `as_of` set, the live predicate is evaluated at that instant
/// (`validAt <= asOf AND (invalidAt IS NULL OR invalidAt > asOf)`)
/// instead of against the current time (spec.md §8 bi-temporal
/// correctness property).
pub async fn list_memories(graph: &dyn GraphClient, user_id: &str, opts: &ListOptions) -> Result<Vec<MemoryRow>, GraphError> {
    let live_predicate = match opts.as_of {
        Some(_) => "m.validAt <= datetime($asOf) AND (m.invalidAt IS NULL OR m.invalidAt > datetime($asOf))",
        None => "m.invalidAt IS NULL",
    };
    let state_predicate = if opts.include_superseded { "m.state <> 'deleted'" } else { "m.state = 'active'" };

    let cypher = format!(
        "MATCH (u:User {{userId: $userId}})-[:HAS_MEMORY]->(m:Memory) \
         WHERE {state_predicate} AND {live_predicate} \
         OPTIONAL MATCH (m)-[:HAS_CATEGORY]->(c:Category) \
         WITH m, collect(c.name) AS categories \
         {category_filter} \
         RETURN m.id AS id, m.content AS content, m.state AS state, m.createdAt AS createdAt, \
                m.updatedAt AS updatedAt, m.validAt AS validAt, m.invalidAt AS invalidAt, categories \
         ORDER BY m.createdAt DESC \
         SKIP toInteger($offset) LIMIT toInteger($limit)",
        state_predicate = state_predicate,
        live_predicate = live_predicate,
        category_filter = if opts.category.is_some() { "WHERE $category IN categories" } else { "" },
    );

    let mut p = vec![
        ("userId", Value::String(user_id.to_string())),
        ("offset", Value::from(opts.offset as i64)),
        ("limit", Value::from(opts.limit as i64)),
    ];
    if let Some(as_of) = opts.as_of {
        p.push(("asOf", Value::String(as_of.to_rfc3339())));
    }
    if let Some(category) = &opts.category {
        p.push(("category", Value::String(category.clone())));
    }

    let rows = graph.run_read(&cypher, params(p)).await?;
    Ok(rows.iter().filter_map(row_to_memory_row).collect())
}

pub async fn count_memories(graph: &dyn GraphClient, user_id: &str, include_superseded: bool) -> Result<i64, GraphError> {
    let state_predicate = if include_superseded { "m.state <> 'deleted'" } else { "m.state = 'active' AND m.invalidAt IS NULL" };
    let cypher = format!(
        "MATCH (u:User {{userId: $userId}})-[:HAS_MEMORY]->(m:Memory) WHERE {state_predicate} RETURN count(m) AS n"
    );
    let rows = graph.run_read(&cypher, params([("userId", Value::String(user_id.to_string()))])).await?;
    Ok(rows.into_iter().next().and_then(|row| row.get("n").and_then(Value::as_i64)).unwrap_or(0))
}

/// Exact id lookup, or the most recently created live memory whose
/// content contains `fragment` (used by `update_memory` when the
/// caller passes a content fragment instead of an id).
pub async fn find_memory(graph: &dyn GraphClient, user_id: &str, memory_id: Option<&str>, content_fragment: Option<&str>) -> Result<Option<MemoryRow>, GraphError> {
    if let Some(id) = memory_id {
        let rows = graph
            .run_read(
                "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory {id: $id}) \
                 OPTIONAL MATCH (m)-[:HAS_CATEGORY]->(c:Category) \
                 WITH m, collect(c.name) AS categories \
                 RETURN m.id AS id, m.content AS content, m.state AS state, m.createdAt AS createdAt, \
                        m.updatedAt AS updatedAt, m.validAt AS validAt, m.invalidAt AS invalidAt, categories",
                params([("userId", Value::String(user_id.to_string())), ("id", Value::String(id.to_string()))]),
            )
            .await?;
        return Ok(rows.iter().filter_map(row_to_memory_row).next());
    }

    let Some(fragment) = content_fragment else {
        return Ok(None);
    };
    let rows = graph
        .run_read(
            "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory) \
             WHERE m.state = 'active' AND m.invalidAt IS NULL AND m.content CONTAINS $fragment \
             OPTIONAL MATCH (m)-[:HAS_CATEGORY]->(c:Category) \
             WITH m, collect(c.name) AS categories \
             RETURN m.id AS id, m.content AS content, m.state AS state, m.createdAt AS createdAt, \
                    m.updatedAt AS updatedAt, m.validAt AS validAt, m.invalidAt AS invalidAt, categories \
             ORDER BY m.createdAt DESC LIMIT 1",
            params([("userId", Value::String(user_id.to_string())), ("fragment", Value::String(fragment.to_string()))]),
        )
        .await?;
    Ok(rows.iter().filter_map(row_to_memory_row).next())
}
