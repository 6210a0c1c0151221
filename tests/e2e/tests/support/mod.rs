//! In-memory doubles for the two storage seams `graphmind-core` talks
//! to (`GraphClient`, `EmbeddingClient`). LLM behavior is scripted with
//! `wiremock` against the real `LlmClient` instead, since dedup
//! verdicts, entity-match decisions and extraction all depend on
//! prompt-specific completions a hand-rolled fake couldn't usefully
//! approximate.
//!
//! [`FakeGraphClient`] understands exactly the Cypher literals
//! `graphmind-core` issues (matched by distinguishing substrings) and
//! replays the nearest-K / predicate semantics a real Neo4j vector
//! index and fulltext index would give, including their "no similarity
//! floor, just top-N" behavior — tests that rely on a seed being
//! excluded by the vector arm need enough unrelated memories in the
//! store to push it out of top-N, the same way they would against a
//! real index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use graphmind_core::graph::{GraphClient, GraphError, Params, Row};
use graphmind_core::providers::embeddings::{EmbeddingClient, EmbeddingError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct FakeMemory {
    pub user_id: String,
    pub content: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub valid_at: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct FakeEntity {
    pub user_id: String,
    pub name: String,
    pub normalized_name: String,
    pub entity_type: String,
    pub description: String,
    pub description_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FakeRelation {
    pub source: String,
    pub target: String,
    pub weight: f32,
    pub invalid: bool,
}

#[derive(Default)]
struct Store {
    users: std::collections::HashSet<String>,
    memories: HashMap<String, FakeMemory>,
    entities: HashMap<String, FakeEntity>,
    mentions: Vec<(String, String)>,
    relations: Vec<FakeRelation>,
    categories: HashMap<String, Vec<String>>,
    next_id: u64,
}

pub struct FakeGraphClient {
    store: Mutex<Store>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn str_param<'a>(p: &'a Params, key: &str) -> &'a str {
    p.get(key).and_then(Value::as_str).unwrap_or("")
}

fn vec_param(p: &Params, key: &str) -> Vec<f32> {
    p.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect())
        .unwrap_or_default()
}

fn usize_param(p: &Params, key: &str, default: usize) -> usize {
    p.get(key).and_then(Value::as_i64).map(|n| n as usize).unwrap_or(default)
}

fn strs_param(p: &Params, key: &str) -> Vec<String> {
    p.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn memory_row(id: &str, m: &FakeMemory, categories: &[String], score: f32) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::String(id.to_string()));
    row.insert("content".to_string(), Value::String(m.content.clone()));
    row.insert("createdAt".to_string(), Value::String(m.created_at.to_rfc3339()));
    row.insert("categories".to_string(), Value::Array(categories.iter().cloned().map(Value::String).collect()));
    row.insert("score".to_string(), Value::from(score));
    row
}

fn full_memory_row(id: &str, m: &FakeMemory, categories: &[String]) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::String(id.to_string()));
    row.insert("content".to_string(), Value::String(m.content.clone()));
    row.insert("state".to_string(), Value::String(m.state.clone()));
    row.insert("createdAt".to_string(), Value::String(m.created_at.to_rfc3339()));
    row.insert("updatedAt".to_string(), Value::String(m.updated_at.to_rfc3339()));
    row.insert("validAt".to_string(), Value::String(m.valid_at.to_rfc3339()));
    row.insert(
        "invalidAt".to_string(),
        m.invalid_at.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null),
    );
    row.insert("categories".to_string(), Value::Array(categories.iter().cloned().map(Value::String).collect()));
    row
}

impl FakeGraphClient {
    pub fn new() -> Self {
        Self { store: Mutex::new(Store::default()) }
    }

    fn fresh_id(store: &mut Store, prefix: &str) -> String {
        store.next_id += 1;
        format!("{prefix}-{}", store.next_id)
    }

    /// Directly seed a live memory, bypassing `add_memory`, for tests
    /// that only care about downstream retrieval/traversal behavior.
    pub fn seed_memory(&self, id: &str, user_id: &str, content: &str, embedding: Vec<f32>) {
        let now = Utc::now();
        self.store.lock().unwrap().memories.insert(
            id.to_string(),
            FakeMemory {
                user_id: user_id.to_string(),
                content: content.to_string(),
                state: "active".to_string(),
                created_at: now,
                updated_at: now,
                valid_at: now,
                invalid_at: None,
                embedding,
            },
        );
        self.store.lock().unwrap().users.insert(user_id.to_string());
    }

    pub fn seed_entity(&self, id: &str, user_id: &str, name: &str, entity_type: &str) {
        let now = Utc::now();
        let mut store = self.store.lock().unwrap();
        store.entities.insert(
            id.to_string(),
            FakeEntity {
                user_id: user_id.to_string(),
                name: name.to_string(),
                normalized_name: graphmind_core::model::Entity::normalize_name(name),
                entity_type: entity_type.to_string(),
                description: name.to_string(),
                description_embedding: None,
                created_at: now,
                updated_at: now,
            },
        );
        store.users.insert(user_id.to_string());
    }

    pub fn seed_mention(&self, memory_id: &str, entity_id: &str) {
        self.store.lock().unwrap().mentions.push((memory_id.to_string(), entity_id.to_string()));
    }

    pub fn seed_relation(&self, source: &str, target: &str, weight: f32) {
        self.store.lock().unwrap().relations.push(FakeRelation { source: source.to_string(), target: target.to_string(), weight, invalid: false });
    }

    pub fn memory_state(&self, id: &str) -> Option<(String, Option<DateTime<Utc>>)> {
        self.store.lock().unwrap().memories.get(id).map(|m| (m.state.clone(), m.invalid_at))
    }

    pub fn entity_name(&self, id: &str) -> Option<String> {
        self.store.lock().unwrap().entities.get(id).map(|e| e.name.clone())
    }

    pub fn live_memory_count(&self, user_id: &str) -> usize {
        self.store.lock().unwrap().memories.values().filter(|m| m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none()).count()
    }
}

impl Default for FakeGraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphClient for FakeGraphClient {
    async fn run_read(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        let store = self.store.lock().unwrap();
        let user_id = str_param(&params, "userId");

        // R2: traversal vector seed — distinct from R1 by the entityIds projection.
        if query.contains("collect(DISTINCT e.id) AS entityIds") && query.contains("collect(DISTINCT memory.id) AS memoryIds") {
            let qv = vec_param(&params, "queryVector");
            let top_n = usize_param(&params, "topN", 5);
            let mut ranked: Vec<(&String, f32)> = store
                .memories
                .iter()
                .filter(|(_, m)| m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none())
                .map(|(id, m)| (id, cosine(&qv, &m.embedding)))
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(top_n);

            let memory_ids: Vec<String> = ranked.iter().map(|(id, _)| (*id).clone()).collect();
            let entity_ids: std::collections::HashSet<String> = store
                .mentions
                .iter()
                .filter(|(mid, _)| memory_ids.contains(mid))
                .map(|(_, eid)| eid.clone())
                .collect();

            let mut row = Row::new();
            row.insert("entityIds".to_string(), Value::Array(entity_ids.into_iter().map(Value::String).collect()));
            row.insert("memoryIds".to_string(), Value::Array(memory_ids.into_iter().map(Value::String).collect()));
            return Ok(vec![row]);
        }

        // R1: hybrid vector arm.
        if query.contains("db.index.vector.queryNodes('memory_vectors'") {
            let qv = vec_param(&params, "queryVector");
            let top_k = usize_param(&params, "topK", 10);
            let mut ranked: Vec<(&String, &FakeMemory, f32)> = store
                .memories
                .iter()
                .filter(|(_, m)| m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none())
                .map(|(id, m)| (id, m, cosine(&qv, &m.embedding)))
                .collect();
            ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(top_k);
            return Ok(ranked
                .into_iter()
                .map(|(id, m, score)| memory_row(id, m, store.categories.get(id).map(|v| v.as_slice()).unwrap_or(&[]), score))
                .collect());
        }

        // R4: entity semantic match.
        if query.contains("db.index.vector.queryNodes('entity_vectors'") {
            let qv = vec_param(&params, "queryVector");
            let floor = params.get("floor").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let mut ranked: Vec<(&String, &FakeEntity, f32)> = store
                .entities
                .iter()
                .filter(|(_, e)| e.user_id == user_id)
                .filter_map(|(id, e)| e.description_embedding.as_ref().map(|emb| (id, e, cosine(&qv, emb))))
                .filter(|(_, _, score)| *score >= floor)
                .collect();
            ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            return Ok(ranked
                .into_iter()
                .map(|(id, e, _)| {
                    let mut row = Row::new();
                    row.insert("id".to_string(), Value::String(id.clone()));
                    row.insert("name".to_string(), Value::String(e.name.clone()));
                    row.insert("description".to_string(), Value::String(e.description.clone()));
                    row
                })
                .collect());
        }

        // R3: hybrid text arm — naive case-insensitive token overlap score.
        if query.contains("db.index.fulltext.queryNodes") {
            let needle = str_param(&params, "query").to_lowercase();
            let needle_tokens: Vec<&str> = needle.split_whitespace().collect();
            let top_k = usize_param(&params, "topK", 10);
            let mut ranked: Vec<(&String, &FakeMemory, f32)> = store
                .memories
                .iter()
                .filter(|(_, m)| m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none())
                .filter_map(|(id, m)| {
                    let haystack = m.content.to_lowercase();
                    let hits = needle_tokens.iter().filter(|t| haystack.contains(*t)).count();
                    if hits == 0 {
                        None
                    } else {
                        Some((id, m, hits as f32))
                    }
                })
                .collect();
            ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(top_k);
            return Ok(ranked
                .into_iter()
                .map(|(id, m, score)| memory_row(id, m, store.categories.get(id).map(|v| v.as_slice()).unwrap_or(&[]), score))
                .collect());
        }

        // R6: entity alias match (PERSON only).
        if query.contains("STARTS WITH $normalizedName OR $normalizedName STARTS WITH") {
            let normalized = str_param(&params, "normalizedName");
            return Ok(store
                .entities
                .iter()
                .filter(|(_, e)| e.user_id == user_id && e.entity_type == "PERSON")
                .filter(|(_, e)| e.normalized_name.starts_with(normalized) || normalized.starts_with(e.normalized_name.as_str()))
                .take(1)
                .map(|(id, e)| {
                    let mut row = Row::new();
                    row.insert("id".to_string(), Value::String(id.clone()));
                    row.insert("name".to_string(), Value::String(e.name.clone()));
                    row.insert("normalizedName".to_string(), Value::String(e.normalized_name.clone()));
                    row
                })
                .collect());
        }

        // R5: entity exact match.
        if query.contains("HAS_ENTITY]->(e:Entity {normalizedName: $normalizedName})") && query.contains("RETURN e.id AS id") {
            let normalized = str_param(&params, "normalizedName");
            return Ok(store
                .entities
                .iter()
                .filter(|(_, e)| e.user_id == user_id && e.normalized_name == normalized)
                .take(1)
                .map(|(id, _)| {
                    let mut row = Row::new();
                    row.insert("id".to_string(), Value::String(id.clone()));
                    row
                })
                .collect());
        }

        // R7: entity apply_upgrades lookup.
        if query.contains("RETURN e.type AS type, e.description AS description") {
            let id = str_param(&params, "id");
            return Ok(store
                .entities
                .get(id)
                .map(|e| {
                    let mut row = Row::new();
                    row.insert("type".to_string(), Value::String(e.entity_type.clone()));
                    row.insert("description".to_string(), Value::String(e.description.clone()));
                    vec![row]
                })
                .unwrap_or_default());
        }

        // R8: list_memories (browse mode, bi-temporal).
        if query.contains("SKIP toInteger($offset) LIMIT toInteger($limit)") {
            let include_superseded = query.contains("m.state <> 'deleted'");
            let as_of: Option<DateTime<Utc>> = params.get("asOf").and_then(Value::as_str).and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&Utc));
            let category = params.get("category").and_then(Value::as_str);
            let offset = usize_param(&params, "offset", 0);
            let limit = usize_param(&params, "limit", usize::MAX);

            let mut rows: Vec<(&String, &FakeMemory)> = store
                .memories
                .iter()
                .filter(|(_, m)| m.user_id == user_id)
                .filter(|(_, m)| if include_superseded { m.state != "deleted" } else { m.state == "active" })
                .filter(|(_, m)| match as_of {
                    Some(t) => m.valid_at <= t && m.invalid_at.map(|inv| inv > t).unwrap_or(true),
                    None => m.invalid_at.is_none(),
                })
                .filter(|(id, _)| match category {
                    Some(c) => store.categories.get(*id).map(|cats| cats.iter().any(|x| x == c)).unwrap_or(false),
                    None => true,
                })
                .collect();
            rows.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
            let page = rows.into_iter().skip(offset).take(limit);
            return Ok(page.map(|(id, m)| full_memory_row(id, m, store.categories.get(id).map(|v| v.as_slice()).unwrap_or(&[]))).collect());
        }

        // R10: find_memory by id.
        if query.contains("m:Memory {id: $id})") && query.contains("RETURN m.id AS id, m.content AS content, m.state AS state,") {
            let id = str_param(&params, "id");
            return Ok(store
                .memories
                .get(id)
                .filter(|m| m.user_id == user_id)
                .map(|m| vec![full_memory_row(id, m, store.categories.get(id).map(|v| v.as_slice()).unwrap_or(&[]))])
                .unwrap_or_default());
        }

        // R11: find_memory by content fragment.
        if query.contains("m.content CONTAINS $fragment") {
            let fragment = str_param(&params, "fragment");
            let mut candidates: Vec<(&String, &FakeMemory)> = store
                .memories
                .iter()
                .filter(|(_, m)| m.user_id == user_id && m.state == "active" && m.invalid_at.is_none() && m.content.contains(fragment))
                .collect();
            candidates.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
            return Ok(candidates
                .into_iter()
                .take(1)
                .map(|(id, m)| full_memory_row(id, m, store.categories.get(id).map(|v| v.as_slice()).unwrap_or(&[])))
                .collect());
        }

        // R12: extraction load_memory_text.
        if query.contains("RETURN m.content AS content, u.userId AS userId") {
            let id = str_param(&params, "id");
            return Ok(store
                .memories
                .get(id)
                .map(|m| {
                    let mut row = Row::new();
                    row.insert("content".to_string(), Value::String(m.content.clone()));
                    row.insert("userId".to_string(), Value::String(m.user_id.clone()));
                    vec![row]
                })
                .unwrap_or_default());
        }

        // R13: extraction load_prior_siblings.
        if query.contains("prior.createdAt < m.createdAt") {
            let id = str_param(&params, "id");
            let limit = usize_param(&params, "limit", 3);
            let Some(anchor) = store.memories.get(id) else {
                return Ok(vec![]);
            };
            let mut prior: Vec<&FakeMemory> = store
                .memories
                .values()
                .filter(|m| m.user_id == user_id && m.created_at < anchor.created_at)
                .collect();
            prior.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            return Ok(prior
                .into_iter()
                .take(limit)
                .map(|m| {
                    let mut row = Row::new();
                    row.insert("content".to_string(), Value::String(m.content.clone()));
                    row
                })
                .collect());
        }

        // R14: write::spawn_post_write inline lookup (no userId anchor).
        if query.trim() == "MATCH (m:Memory {id: $id}) RETURN m.content AS content" {
            let id = str_param(&params, "id");
            return Ok(store
                .memories
                .get(id)
                .map(|m| {
                    let mut row = Row::new();
                    row.insert("content".to_string(), Value::String(m.content.clone()));
                    vec![row]
                })
                .unwrap_or_default());
        }

        // R15: traversal term_seed_entities.
        if query.contains("nameHits + edgeHits AS entityIds") {
            let terms = strs_param(&params, "terms").into_iter().map(|t| t.to_lowercase()).collect::<Vec<_>>();
            let name_hits: Vec<String> = store
                .entities
                .iter()
                .filter(|(_, e)| e.user_id == user_id)
                .filter(|(_, e)| terms.iter().any(|t| e.name.to_lowercase().contains(t) || e.description.to_lowercase().contains(t)))
                .map(|(id, _)| id.clone())
                .collect();
            let mut row = Row::new();
            row.insert("entityIds".to_string(), Value::Array(name_hits.into_iter().map(Value::String).collect()));
            return Ok(vec![row]);
        }

        // R16 / R17: community priming — no communities modeled, vacuous.
        if query.contains("HAS_COMMUNITY]->(c:Community)") || query.contains("IN_COMMUNITY]->(c:Community)<-[:IN_COMMUNITY]-(sibling:Memory)") {
            let mut row = Row::new();
            row.insert("entityIds".to_string(), Value::Array(vec![]));
            return Ok(vec![row]);
        }

        // R18: traversal expand — variable-length RELATED_TO walk.
        if query.contains("RELATED_TO*1..") {
            let max_depth: u32 = query
                .find("RELATED_TO*1..")
                .and_then(|start| {
                    let rest = &query[start + "RELATED_TO*1..".len()..];
                    let end = rest.find(']')?;
                    rest[..end].parse().ok()
                })
                .unwrap_or(2);
            let seed_ids = strs_param(&params, "seedIds");

            let mut frontier: std::collections::HashMap<String, (u32, f32)> = seed_ids.iter().map(|id| (id.clone(), (0u32, 1.0f32))).collect();
            let mut current: std::collections::HashSet<String> = seed_ids.iter().cloned().collect();
            for hop in 1..=max_depth {
                let mut next = std::collections::HashSet::new();
                for rel in store.relations.iter().filter(|r| !r.invalid) {
                    for (from, to) in [(rel.source.clone(), rel.target.clone()), (rel.target.clone(), rel.source.clone())] {
                        if current.contains(&from) && !frontier.contains_key(&to) {
                            next.insert(to.clone());
                            frontier.insert(to, (hop, rel.weight));
                        }
                    }
                }
                if next.is_empty() {
                    break;
                }
                current = next;
            }

            return Ok(frontier
                .into_iter()
                .filter(|(id, (hop, _))| *hop > 0 || seed_ids.contains(id))
                .map(|(id, (hop, weight))| {
                    let mut row = Row::new();
                    row.insert("entityId".to_string(), Value::String(id));
                    row.insert("hop".to_string(), Value::from(hop as i64));
                    row.insert("avgWeight".to_string(), Value::from(weight));
                    row
                })
                .collect());
        }

        // R19: traversal collect_memories.
        if query.contains("RETURN m.id AS memoryId, collect(e.id) AS entityIds") {
            let entity_ids = strs_param(&params, "entityIds");
            let mut by_memory: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
            for (mid, eid) in &store.mentions {
                if entity_ids.contains(eid) {
                    if let Some(m) = store.memories.get(mid) {
                        if m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none() {
                            by_memory.entry(mid.clone()).or_default().push(eid.clone());
                        }
                    }
                }
            }
            return Ok(by_memory
                .into_iter()
                .map(|(mid, eids)| {
                    let mut row = Row::new();
                    row.insert("memoryId".to_string(), Value::String(mid));
                    row.insert("entityIds".to_string(), Value::Array(eids.into_iter().map(Value::String).collect()));
                    row
                })
                .collect());
        }

        // community::live_memory_count — state != deleted AND invalidAt IS NULL.
        if query.contains("m.state <> 'deleted' AND m.invalidAt IS NULL") && query.contains("RETURN count(m) AS n") {
            let n = store.memories.values().filter(|m| m.user_id == user_id && m.state != "deleted" && m.invalid_at.is_none()).count();
            let mut row = Row::new();
            row.insert("n".to_string(), Value::from(n as i64));
            return Ok(vec![row]);
        }

        // R9: count_memories.
        if query.contains("RETURN count(m) AS n") {
            let include_superseded = query.contains("m.state <> 'deleted'");
            let n = store
                .memories
                .values()
                .filter(|m| m.user_id == user_id)
                .filter(|m| if include_superseded { m.state != "deleted" } else { m.state == "active" && m.invalid_at.is_none() })
                .count();
            let mut row = Row::new();
            row.insert("n".to_string(), Value::from(n as i64));
            return Ok(vec![row]);
        }

        // R21: community fetch_member_texts.
        if query.contains("WHERE m.id IN $ids RETURN m.content AS content") {
            let ids = strs_param(&params, "ids");
            return Ok(store
                .memories
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(_, m)| {
                    let mut row = Row::new();
                    row.insert("content".to_string(), Value::String(m.content.clone()));
                    row
                })
                .collect());
        }

        // R20: GDS Louvain — not modeled, no communities.
        if query.contains("gds.louvain.stream") {
            return Ok(vec![]);
        }

        Ok(vec![])
    }

    async fn run_write(&self, query: &str, params: Params) -> Result<Vec<Row>, GraphError> {
        let mut store = self.store.lock().unwrap();

        // W1: ensure_user.
        if query.trim() == "MERGE (u:User {userId: $userId}) ON CREATE SET u.createdAt = datetime()" {
            store.users.insert(str_param(&params, "userId").to_string());
            return Ok(vec![]);
        }

        // W2: add_memory.
        if query.contains("randomUUID(), content: $text") {
            let user_id = str_param(&params, "userId").to_string();
            store.users.insert(user_id.clone());
            let id = Self::fresh_id(&mut store, "mem");
            let now = Utc::now();
            store.memories.insert(
                id.clone(),
                FakeMemory {
                    user_id,
                    content: str_param(&params, "text").to_string(),
                    state: "active".to_string(),
                    created_at: now,
                    updated_at: now,
                    valid_at: now,
                    invalid_at: None,
                    embedding: vec_param(&params, "embedding"),
                },
            );
            let mut row = Row::new();
            row.insert("id".to_string(), Value::String(id));
            return Ok(vec![row]);
        }

        // W3: supersede_memory.
        if query.contains("SET old.invalidAt = datetime(), old.state = 'archived'") {
            let old_id = str_param(&params, "oldId").to_string();
            if let Some(m) = store.memories.get_mut(&old_id) {
                m.invalid_at = Some(Utc::now());
                m.state = "archived".to_string();
            }
            return Ok(vec![]);
        }

        // W4: delete_memory.
        if query.contains("SET m.state = 'deleted', m.invalidAt = datetime()") {
            let id = str_param(&params, "id").to_string();
            if let Some(m) = store.memories.get_mut(&id) {
                m.state = "deleted".to_string();
                m.invalid_at = Some(Utc::now());
            }
            return Ok(vec![]);
        }

        // W5: entity alias_match display-name upgrade.
        if query.trim() == "MATCH (e:Entity {id: $id}) SET e.name = $name" {
            let id = str_param(&params, "id").to_string();
            let name = str_param(&params, "name").to_string();
            if let Some(e) = store.entities.get_mut(&id) {
                e.name = name;
            }
            return Ok(vec![]);
        }

        // W6: entity create_or_merge.
        if query.contains("ON CREATE SET e.id = randomUUID()") {
            let user_id = str_param(&params, "userId").to_string();
            let normalized_name = str_param(&params, "normalizedName").to_string();
            store.users.insert(user_id.clone());
            if let Some((id, _)) = store.entities.iter().find(|(_, e)| e.user_id == user_id && e.normalized_name == normalized_name) {
                let id = id.clone();
                let mut row = Row::new();
                row.insert("id".to_string(), Value::String(id));
                return Ok(vec![row]);
            }
            let id = Self::fresh_id(&mut store, "ent");
            let now = Utc::now();
            store.entities.insert(
                id.clone(),
                FakeEntity {
                    user_id,
                    name: str_param(&params, "name").to_string(),
                    normalized_name,
                    entity_type: str_param(&params, "type").to_string(),
                    description: str_param(&params, "description").to_string(),
                    description_embedding: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            let mut row = Row::new();
            row.insert("id".to_string(), Value::String(id));
            return Ok(vec![row]);
        }

        // W7: entity apply_upgrades.
        if query.starts_with("MATCH (e:Entity {id: $id}) SET ") && query.contains("e.updatedAt = datetime()") {
            let id = str_param(&params, "id").to_string();
            if let Some(e) = store.entities.get_mut(&id) {
                if let Some(t) = params.get("type").and_then(Value::as_str) {
                    e.entity_type = t.to_string();
                }
                if let Some(d) = params.get("description").and_then(Value::as_str) {
                    e.description = d.to_string();
                }
                e.updated_at = Utc::now();
            }
            return Ok(vec![]);
        }

        // W8: entity persist_description_embedding.
        if query.contains("SET e.descriptionEmbedding = $embedding") {
            let id = str_param(&params, "id").to_string();
            if let Some(e) = store.entities.get_mut(&id) {
                e.description_embedding = Some(vec_param(&params, "embedding"));
            }
            return Ok(vec![]);
        }

        // W9: extraction link_mention.
        if query.contains("MERGE (m)-[:MENTIONS]->(e)") {
            store.mentions.push((str_param(&params, "memoryId").to_string(), str_param(&params, "entityId").to_string()));
            return Ok(vec![]);
        }

        // W10: extraction link_relationship.
        if query.contains("MERGE (src)-[r:RELATED_TO {type: $relationType}]->(tgt)") {
            store.relations.push(FakeRelation {
                source: str_param(&params, "sourceId").to_string(),
                target: str_param(&params, "targetId").to_string(),
                weight: 0.5,
                invalid: false,
            });
            return Ok(vec![]);
        }

        // W11: categorize.
        if query.contains("MERGE (c:Category {name: label})") {
            let memory_id = str_param(&params, "memoryId").to_string();
            let labels = strs_param(&params, "labels");
            store.categories.entry(memory_id).or_default().extend(labels);
            return Ok(vec![]);
        }

        // W12 / W13: community writes — not exercised by the seed scenarios.
        if query.contains("DETACH DELETE c") || query.contains("CREATE (c:Community {id: randomUUID()") {
            return Ok(vec![]);
        }

        Ok(vec![])
    }
}

/// Deterministic embeddings keyed by exact input text, so tests can
/// hand-pick cosine relationships between memories/entities without
/// depending on a real model.
pub struct FakeEmbeddingClient {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    dimension: usize,
}

impl FakeEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self { vectors: Mutex::new(HashMap::new()), dimension }
    }

    pub fn register(&self, text: &str, vector: Vec<f32>) {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(v) = self.vectors.lock().unwrap().get(text) {
            return Ok(v.clone());
        }
        // Unregistered text gets a stable, content-derived filler vector
        // so it never accidentally collides with a registered one.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        text.hash(&mut hasher);
        let seed = hasher.finish();
        Ok((0..self.dimension).map(|i| (((seed.wrapping_add(i as u64)) % 1000) as f32) / 1000.0).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
