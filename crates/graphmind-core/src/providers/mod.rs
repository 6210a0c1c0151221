//! Embedding + LLM clients (C2)
//!
//! Provider-selected embedding vectors and chat-completion calls with
//! JSON-mode parsing. Both clients are stateless and safe to call
//! concurrently (spec.md §5).

pub mod embeddings;
pub mod llm;

pub use embeddings::{EmbeddingClient, EmbeddingError};
pub use llm::{LlmClient, LlmError};
