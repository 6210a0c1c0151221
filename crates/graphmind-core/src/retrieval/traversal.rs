//! Graph traversal retrieval (C9)
//!
//! Two mutually exclusive seeding paths (vector vs term), a
//! community-priming pass, and a weight-aware multi-hop expansion. All
//! traversal is pushed into Cypher — nothing here hydrates the entity
//! graph into in-memory adjacency structures (spec.md §9).

use crate::graph::{params, GraphClient, GraphError};
use crate::providers::llm::{parse_lenient_json, LlmClient};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const MIN_DEPTH: u32 = 1;
const MAX_DEPTH: u32 = 5;
const DEFAULT_DEPTH: u32 = 2;
const DEFAULT_WEIGHT: f32 = 0.5;
const TERM_MIN_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub memory_id: String,
    pub hop_distance: u32,
    pub avg_weight: f32,
}

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub limit: usize,
    pub max_depth: u32,
    pub query_vector: Option<Vec<f32>>,
}

pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

#[derive(Debug, Deserialize)]
struct TermExtractionResponse(Vec<String>);

/// Extract lowercase multi-word terms from the query via an LLM
/// prompt; on any failure (request or parse) fall back to a regex
/// path: lowercase, strip punctuation, keep tokens >= 3 chars.
async fn extract_terms(llm: &LlmClient, query: &str) -> Vec<String> {
    let system = "Extract the key search terms from the user's query. \
                  Return a JSON array of lowercase strings, each a single word or short phrase. \
                  Return only the JSON array.";
    match llm.chat(system, query, true).await {
        Ok(text) => match parse_lenient_json::<TermExtractionResponse>(&text) {
            crate::providers::llm::ParseResult::Parsed(terms) => terms.0,
            crate::providers::llm::ParseResult::Error(_) => regex_fallback_terms(query),
        },
        Err(_) => regex_fallback_terms(query),
    }
}

fn regex_fallback_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= TERM_MIN_LEN)
        .map(str::to_string)
        .collect()
}

async fn vector_seed_entities(
    graph: &dyn GraphClient,
    user_id: &str,
    query_vector: &[f32],
    top_n: usize,
) -> Result<(HashSet<String>, Vec<String>), GraphError> {
    let cypher = "CALL db.index.vector.queryNodes('memory_vectors', $topN, $queryVector) \
                  YIELD node AS memory, score \
                  MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(memory) \
                  WHERE memory.state <> 'deleted' AND memory.invalidAt IS NULL \
                  WITH memory ORDER BY score DESC \
                  OPTIONAL MATCH (memory)-[:MENTIONS]->(e:Entity) \
                  RETURN collect(DISTINCT e.id) AS entityIds, collect(DISTINCT memory.id) AS memoryIds";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("queryVector", Value::Array(query_vector.iter().map(|f| Value::from(*f)).collect())),
                ("topN", Value::from(top_n as i64)),
            ]),
        )
        .await?;

    let row = rows.into_iter().next().unwrap_or_default();
    let entity_ids: HashSet<String> = row
        .get("entityIds")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let seed_memory_ids: Vec<String> = row
        .get("memoryIds")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Ok((entity_ids, seed_memory_ids))
}

async fn community_priming_by_memories(
    graph: &dyn GraphClient,
    user_id: &str,
    seed_memory_ids: &[String],
    exclude: &HashSet<String>,
) -> Result<HashSet<String>, GraphError> {
    if seed_memory_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let cypher = "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory) \
                  WHERE m.id IN $seedIds \
                  MATCH (m)-[:IN_COMMUNITY]->(c:Community)<-[:IN_COMMUNITY]-(sibling:Memory) \
                  MATCH (sibling)-[:MENTIONS]->(e:Entity) \
                  RETURN collect(DISTINCT e.id) AS entityIds";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("seedIds", Value::Array(seed_memory_ids.iter().map(|s| Value::String(s.clone())).collect())),
            ]),
        )
        .await?;

    let ids: HashSet<String> = rows
        .into_iter()
        .next()
        .and_then(|row| row.get("entityIds").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .filter(|id| !exclude.contains(id))
        .collect();
    Ok(ids)
}

async fn term_seed_entities(
    graph: &dyn GraphClient,
    user_id: &str,
    terms: &[String],
) -> Result<HashSet<String>, GraphError> {
    if terms.is_empty() {
        return Ok(HashSet::new());
    }
    let cypher = "MATCH (u:User {userId: $userId})-[:HAS_ENTITY]->(e:Entity) \
                  WHERE any(t IN $terms WHERE \
                    toLower(e.name) CONTAINS t OR toLower(e.description) CONTAINS t) \
                  WITH collect(DISTINCT e.id) AS nameHits \
                  MATCH (u:User {userId: $userId})-[:HAS_ENTITY]->(src:Entity)-[r:RELATED_TO]-(dst:Entity) \
                  WHERE r.invalidAt IS NULL AND any(t IN $terms WHERE \
                    toLower(r.type) CONTAINS t OR toLower(r.description) CONTAINS t) \
                  WITH nameHits, collect(DISTINCT src.id) + collect(DISTINCT dst.id) AS edgeHits \
                  RETURN nameHits + edgeHits AS entityIds";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("terms", Value::Array(terms.iter().map(|t| Value::String(t.clone())).collect())),
            ]),
        )
        .await?;

    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.get("entityIds").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

async fn community_priming_by_terms(
    graph: &dyn GraphClient,
    user_id: &str,
    terms: &[String],
    exclude: &HashSet<String>,
) -> Result<HashSet<String>, GraphError> {
    if terms.is_empty() {
        return Ok(HashSet::new());
    }
    let cypher = "MATCH (u:User {userId: $userId})-[:HAS_COMMUNITY]->(c:Community) \
                  WHERE any(t IN $terms WHERE \
                    toLower(c.name) CONTAINS t OR toLower(c.summary) CONTAINS t) \
                  MATCH (c)<-[:IN_COMMUNITY]-(m:Memory)-[:MENTIONS]->(e:Entity) \
                  RETURN collect(DISTINCT e.id) AS entityIds";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("terms", Value::Array(terms.iter().map(|t| Value::String(t.clone())).collect())),
            ]),
        )
        .await?;

    Ok(rows
        .into_iter()
        .next()
        .and_then(|row| row.get("entityIds").and_then(Value::as_array).cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .filter(|id| !exclude.contains(id))
        .collect())
}

/// Variable-length expansion from the union of direct + primed seeds.
/// Neighbor fan-out ordered by `rank DESC` (GraphRAG-style: hubs
/// first). Tracks the minimum hop distance and the average per-path
/// edge weight per reached entity (missing weight defaults to 0.5).
async fn expand(
    graph: &dyn GraphClient,
    user_id: &str,
    seeds: &HashSet<String>,
    max_depth: u32,
) -> Result<HashMap<String, (u32, f32)>, GraphError> {
    if seeds.is_empty() {
        return Ok(HashMap::new());
    }
    let seed_ids: Vec<String> = seeds.iter().cloned().collect();
    let cypher = format!(
        "MATCH (u:User {{userId: $userId}})-[:HAS_ENTITY]->(seed:Entity) \
         WHERE seed.id IN $seedIds \
         MATCH path = (seed)-[rels:RELATED_TO*1..{max_depth}]-(neighbor:Entity) \
         WHERE ALL(r IN rels WHERE r.invalidAt IS NULL) \
         WITH neighbor, length(path) AS hop, \
              reduce(total = 0.0, r IN rels | total + coalesce(r.weight, {default_weight})) / size(rels) AS avgWeight, \
              neighbor.rank AS rank \
         ORDER BY rank DESC \
         RETURN neighbor.id AS entityId, hop, avgWeight",
        max_depth = max_depth,
        default_weight = DEFAULT_WEIGHT,
    );

    let rows = graph
        .run_read(
            &cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("seedIds", Value::Array(seed_ids.iter().map(|s| Value::String(s.clone())).collect())),
            ]),
        )
        .await?;

    let mut reached: HashMap<String, (u32, f32)> = HashMap::new();
    // Seeds themselves are reached at hop 0 with full weight.
    for id in &seed_ids {
        reached.insert(id.clone(), (0, 1.0));
    }

    for row in rows {
        let Some(entity_id) = row.get("entityId").and_then(Value::as_str) else {
            continue;
        };
        let hop = row.get("hop").and_then(Value::as_u64).unwrap_or(0) as u32;
        let avg_weight = row.get("avgWeight").and_then(Value::as_f64).unwrap_or(DEFAULT_WEIGHT as f64) as f32;

        reached
            .entry(entity_id.to_string())
            .and_modify(|(best_hop, best_weight)| {
                if hop < *best_hop || (hop == *best_hop && avg_weight > *best_weight) {
                    *best_hop = hop;
                    *best_weight = avg_weight;
                }
            })
            .or_insert((hop, avg_weight));
    }

    Ok(reached)
}

/// For each reached entity, find memories via `MENTIONS`, inheriting
/// the minimum hop distance across the entities that mention each
/// memory, then apply `limit`.
async fn collect_memories(
    graph: &dyn GraphClient,
    user_id: &str,
    reached: &HashMap<String, (u32, f32)>,
    limit: usize,
) -> Result<Vec<TraversalHit>, GraphError> {
    if reached.is_empty() {
        return Ok(Vec::new());
    }
    let entity_ids: Vec<String> = reached.keys().cloned().collect();
    let cypher = "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory) \
                  WHERE m.state <> 'deleted' AND m.invalidAt IS NULL \
                  MATCH (m)-[:MENTIONS]->(e:Entity) \
                  WHERE e.id IN $entityIds \
                  RETURN m.id AS memoryId, collect(e.id) AS entityIds";

    let rows = graph
        .run_read(
            cypher,
            params([
                ("userId", Value::String(user_id.to_string())),
                ("entityIds", Value::Array(entity_ids.iter().map(|s| Value::String(s.clone())).collect())),
            ]),
        )
        .await?;

    let mut hits: Vec<TraversalHit> = rows
        .into_iter()
        .filter_map(|row| {
            let memory_id = row.get("memoryId")?.as_str()?.to_string();
            let mentioned: Vec<String> = row
                .get("entityIds")?
                .as_array()?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();

            let best = mentioned
                .iter()
                .filter_map(|id| reached.get(id))
                .min_by(|a, b| a.0.cmp(&b.0).then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)))?;

            Some(TraversalHit {
                memory_id,
                hop_distance: best.0,
                avg_weight: best.1,
            })
        })
        .collect();

    hits.sort_by(|a, b| a.hop_distance.cmp(&b.hop_distance).then(b.avg_weight.partial_cmp(&a.avg_weight).unwrap_or(std::cmp::Ordering::Equal)));
    hits.truncate(limit);
    Ok(hits)
}

pub async fn traverse_entity_graph(
    graph: &dyn GraphClient,
    llm: &LlmClient,
    user_id: &str,
    query: &str,
    options: TraversalOptions,
) -> Result<Vec<TraversalHit>, GraphError> {
    let max_depth = clamp_depth(if options.max_depth == 0 { DEFAULT_DEPTH } else { options.max_depth });

    let seeds = if let Some(query_vector) = &options.query_vector {
        let (direct, seed_memory_ids) = vector_seed_entities(graph, user_id, query_vector, 5).await?;
        let primed = community_priming_by_memories(graph, user_id, &seed_memory_ids, &direct).await?;
        direct.into_iter().chain(primed).collect::<HashSet<_>>()
    } else {
        let terms = extract_terms(llm, query).await;
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let direct = term_seed_entities(graph, user_id, &terms).await?;
        let primed = community_priming_by_terms(graph, user_id, &terms, &direct).await?;
        direct.into_iter().chain(primed).collect::<HashSet<_>>()
    };

    if seeds.is_empty() {
        return Ok(Vec::new());
    }

    let reached = expand(graph, user_id, &seeds, max_depth).await?;
    collect_memories(graph, user_id, &reached, options.limit).await
}
