//! Hybrid (C8) + graph traversal (C9) retrieval
//!
//! Query path: BM25 arm ∥ vector arm → RRF fusion (`hybrid`), or
//! seed discovery → weight-aware multi-hop expansion (`traversal`).
//! Neither arm hydrates the entity graph into in-memory structures
//! (spec.md §9) — every hop is a Cypher query.

pub mod hybrid;
pub mod traversal;

pub use hybrid::{hybrid_search, HybridMode, HybridResult, SearchFilters, SearchResponse};
pub use traversal::{traverse_entity_graph, TraversalHit};

#[derive(Debug, Clone)]
pub struct CandidateMemory {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub categories: Vec<String>,
}
