//! Write pipeline (C7)
//!
//! `addMemory` / `supersedeMemory` / `deleteMemory`, plus the batch
//! orchestrator that processes items strictly sequentially and drains
//! each item's fire-and-forget extraction under a capped timeout
//! before starting the next write (spec.md §4.7).

use crate::cache::PairCache;
use crate::categorize;
use crate::config::Config;
use crate::dedup::{self, DedupAction};
use crate::extraction;
use crate::graph::{params, GraphClient, GraphError};
use crate::providers::embeddings::EmbeddingClient;
use crate::providers::llm::LlmClient;
use crate::task::BackgroundTask;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AddMemoryRequest {
    pub text: String,
    pub user_id: String,
    pub app_name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Add { id: String },
    Supersede { old_id: String, new_id: String },
    SkipDuplicate { existing_id: String },
    Error { message: String },
}

pub struct WritePipeline {
    graph: Arc<dyn GraphClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    llm: Arc<LlmClient>,
    cache: Arc<PairCache>,
    config: Arc<Config>,
}

impl WritePipeline {
    pub fn new(graph: Arc<dyn GraphClient>, embeddings: Arc<dyn EmbeddingClient>, llm: Arc<LlmClient>, cache: Arc<PairCache>, config: Arc<Config>) -> Self {
        Self { graph, embeddings, llm, cache, config }
    }

    /// Spawn the fire-and-forget extraction + categorization task for
    /// a freshly written memory.
    fn spawn_post_write(&self, memory_id: String) -> BackgroundTask {
        let graph = self.graph.clone();
        let embeddings = self.embeddings.clone();
        let llm = self.llm.clone();
        BackgroundTask::spawn(async move {
            let text_row = graph
                .run_read(
                    "MATCH (m:Memory {id: $id}) RETURN m.content AS content",
                    params([("id", Value::String(memory_id.clone()))]),
                )
                .await
                .ok()
                .and_then(|rows| rows.into_iter().next())
                .and_then(|row| row.get("content").and_then(Value::as_str).map(str::to_string));

            extraction::run(graph.as_ref(), embeddings.as_ref(), llm.as_ref(), memory_id.clone()).await;
            if let Some(text) = text_row {
                categorize::categorize_memory(graph.as_ref(), llm.as_ref(), &memory_id, &text).await;
            }
        })
    }

    /// Create a Memory with `validAt = now`, `state = 'active'`. Fatal
    /// on embedding failure — a Memory cannot be written without one.
    pub async fn add_memory(&self, req: &AddMemoryRequest) -> Result<(String, BackgroundTask), GraphError> {
        let embedding = self
            .embeddings
            .embed(&req.text)
            .await
            .map_err(|e| GraphError::Query(format!("embedding failed: {e}")))?;

        let rows = self
            .graph
            .run_write(
                "MERGE (u:User {userId: $userId}) ON CREATE SET u.createdAt = datetime() \
                 MERGE (a:App {name: $appName}) \
                 CREATE (m:Memory {id: randomUUID(), content: $text, state: 'active', \
                                   createdAt: datetime(), updatedAt: datetime(), \
                                   validAt: datetime(), embedding: $embedding}) \
                 MERGE (u)-[:HAS_MEMORY]->(m) \
                 MERGE (m)-[:CREATED_BY]->(a) \
                 RETURN m.id AS id",
                params([
                    ("userId", Value::String(req.user_id.clone())),
                    ("appName", Value::String(req.app_name.clone())),
                    ("text", Value::String(req.text.clone())),
                    ("embedding", Value::Array(embedding.iter().map(|f| Value::from(*f)).collect())),
                ]),
            )
            .await?;

        let id = rows
            .into_iter()
            .next()
            .and_then(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| GraphError::Query("addMemory returned no id".into()))?;

        let task = self.spawn_post_write(id.clone());
        Ok((id, task))
    }

    /// Insert the new Memory, stamp the old one `invalidAt = now`, and
    /// wire `SUPERSEDES`.
    pub async fn supersede_memory(&self, old_id: &str, new_text: &str, user_id: &str, app_name: &str) -> Result<(String, BackgroundTask), GraphError> {
        let req = AddMemoryRequest { text: new_text.to_string(), user_id: user_id.to_string(), app_name: app_name.to_string(), tags: Vec::new() };
        let (new_id, task) = self.add_memory(&req).await?;

        self.graph
            .run_write(
                "MATCH (old:Memory {id: $oldId}), (new:Memory {id: $newId}) \
                 SET old.invalidAt = datetime(), old.state = 'archived' \
                 MERGE (new)-[:SUPERSEDES {createdAt: datetime()}]->(old)",
                params([
                    ("oldId", Value::String(old_id.to_string())),
                    ("newId", Value::String(new_id.clone())),
                ]),
            )
            .await?;

        Ok((new_id, task))
    }

    /// Soft delete: `state = 'deleted'`, `invalidAt = now`. The node is
    /// retained for history.
    pub async fn delete_memory(&self, memory_id: &str, user_id: &str) -> Result<(), GraphError> {
        self.graph
            .run_write(
                "MATCH (u:User {userId: $userId})-[:HAS_MEMORY]->(m:Memory {id: $id}) \
                 SET m.state = 'deleted', m.invalidAt = datetime()",
                params([
                    ("userId", Value::String(user_id.to_string())),
                    ("id", Value::String(memory_id.to_string())),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn process_one(&self, req: &AddMemoryRequest) -> Result<(BatchOutcome, Option<BackgroundTask>), GraphError> {
        let action = dedup::check_deduplication(
            self.graph.as_ref(),
            self.embeddings.as_ref(),
            self.llm.as_ref(),
            self.cache.as_ref(),
            self.config.as_ref(),
            &req.text,
            &req.user_id,
            &req.tags,
        )
        .await?;

        match action {
            DedupAction::Insert => {
                let (id, task) = self.add_memory(req).await?;
                Ok((BatchOutcome::Add { id }, Some(task)))
            }
            DedupAction::Skip { existing_id } => Ok((BatchOutcome::SkipDuplicate { existing_id }, None)),
            DedupAction::Supersede { existing_id } => {
                let (new_id, task) = self.supersede_memory(&existing_id, &req.text, &req.user_id, &req.app_name).await?;
                Ok((BatchOutcome::Supersede { old_id: existing_id, new_id }, Some(task)))
            }
        }
    }

    /// Process items strictly sequentially. Between items, await the
    /// previous item's extraction under the configured drain cap
    /// before starting the next write; per-item errors are isolated.
    pub async fn process_batch(&self, items: Vec<AddMemoryRequest>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        let mut pending_task: Option<BackgroundTask> = None;

        for item in items {
            if let Some(task) = pending_task.take() {
                task.drain(self.config.extraction_drain_timeout).await;
            }

            match self.process_one(&item).await {
                Ok((outcome, task)) => {
                    pending_task = task;
                    outcomes.push(outcome);
                }
                Err(e) => outcomes.push(BatchOutcome::Error { message: e.to_string() }),
            }
        }

        if let Some(task) = pending_task.take() {
            task.drain(self.config.extraction_drain_timeout).await;
        }

        outcomes
    }
}
