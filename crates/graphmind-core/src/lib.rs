//! # GraphMind Core
//!
//! Agent-native long-term memory store: a per-user bi-temporal knowledge
//! graph fed by LLM-agent facts, with entity extraction, deduplication, and
//! hybrid (lexical + vector + graph) retrieval.
//!
//! Four tightly coupled subsystems make up the core:
//!
//! - **Write pipeline** ([`write`]): dedup decision, bi-temporal
//!   insert/supersede, fire-and-forget entity extraction + categorization.
//! - **Deduplication engine** ([`dedup`]): vector candidate recall, lexical
//!   negation gate, tag-aware reordering, cached LLM pair classification.
//! - **Entity resolution** ([`entity`]): exact/alias/semantic matching with
//!   open-ontology type upgrade and a race-safe atomic MERGE.
//! - **Hybrid retrieval** ([`retrieval`]): BM25 + vector via Reciprocal Rank
//!   Fusion, plus entity-graph traversal with weight-aware multi-hop
//!   expansion and community-priming seeding.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use graphmind_core::{Config, GraphClient};
//! use graphmind_core::write::{AddMemoryRequest, WritePipeline};
//!
//! let config = Config::from_env();
//! let pipeline = WritePipeline::new(graph, embeddings, llm, cache, Arc::new(config));
//! let (id, task) = pipeline.add_memory(&AddMemoryRequest {
//!     text: "I live in NYC".into(),
//!     user_id: "user-1".into(),
//!     app_name: "agent".into(),
//!     tags: vec![],
//! }).await?;
//! task.drain(std::time::Duration::from_secs(3)).await;
//! ```
//!
//! ## Feature flags
//!
//! - `nomic-local` (default): local ONNX embeddings via `fastembed`, used
//!   when `EMBEDDING_PROVIDER=nomic`.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod categorize;
pub mod community;
pub mod config;
pub mod dedup;
pub mod entity;
pub mod extraction;
pub mod graph;
pub mod model;
pub mod providers;
pub mod query;
pub mod retrieval;
pub mod task;
pub mod write;

pub use cache::PairCache;
pub use config::{Config, DedupThresholds, EmbeddingProvider, GraphConfig};
pub use graph::{GraphClient, GraphError, Neo4jClient, Params, Row};
pub use model::{Category, Community, Entity, EntityType, Memory, MemoryState, RelatedTo};
pub use providers::{EmbeddingClient, EmbeddingError, LlmClient, LlmError};
pub use task::BackgroundTask;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed RRF fusion constant used throughout hybrid retrieval (spec.md §4.8).
pub const RRF_K: f32 = 60.0;

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::cache::PairCache;
    pub use crate::categorize::categorize_memory;
    pub use crate::community::rebuild_clusters;
    pub use crate::config::{Config, EmbeddingProvider};
    pub use crate::dedup::{check_deduplication, DedupAction};
    pub use crate::entity::{resolve_entity, NewEntity};
    pub use crate::graph::{GraphClient, GraphError, Neo4jClient};
    pub use crate::model::{Entity, EntityType, Memory, MemoryState};
    pub use crate::providers::{EmbeddingClient, LlmClient};
    pub use crate::query::{list_memories, ListOptions};
    pub use crate::retrieval::{hybrid_search, traverse_entity_graph, HybridMode};
    pub use crate::task::BackgroundTask;
    pub use crate::write::{AddMemoryRequest, BatchOutcome, WritePipeline};
}
