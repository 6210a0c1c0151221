//! Provider-selected embedding vectors
//!
//! `embed(text) -> float32[d]` where `d` is fixed per provider
//! (spec.md §6). The active provider is a closed tagged enum
//! ([`crate::config::EmbeddingProvider`]), never a bare string.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider request failed: {0}")]
    Request(String),
    #[error("embedding model not initialized: {0}")]
    NotInitialized(String),
}

/// Provider-agnostic embedding contract.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// HTTP-backed embedding client for hosted providers (Azure OpenAI
/// embeddings, or the "intelli" in-house model endpoint).
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    dimension: usize,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: String, api_key: String, dimension: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            input: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            embedding: Vec<f32>,
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Req { input: text })
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?
            .json::<Resp>()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(resp.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(feature = "nomic-local")]
pub struct NomicLocalEmbeddingClient {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    dimension: usize,
}

#[cfg(feature = "nomic-local")]
impl NomicLocalEmbeddingClient {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::NotInitialized(e.to_string()))?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
            dimension,
        })
    }
}

#[cfg(feature = "nomic-local")]
#[async_trait]
impl EmbeddingClient for NomicLocalEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::NotInitialized(e.to_string()))?;
        let mut vectors = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Request("empty embedding batch".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedding client matching [`Config::embedding_provider`].
/// This is the one call site (besides dedup threshold selection) that
/// is allowed to branch on the active provider.
pub fn build_from_config(config: &Config) -> Result<Box<dyn EmbeddingClient>, EmbeddingError> {
    match config.embedding_provider {
        EmbeddingProvider::Azure => Ok(Box::new(HttpEmbeddingClient::new(
            std::env::var("AZURE_EMBEDDING_ENDPOINT").unwrap_or_default(),
            config.embedding_api_key.clone().unwrap_or_default(),
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Intelli => Ok(Box::new(HttpEmbeddingClient::new(
            std::env::var("INTELLI_EMBEDDING_ENDPOINT").unwrap_or_default(),
            config.embedding_api_key.clone().unwrap_or_default(),
            config.embedding_dimension,
        ))),
        #[cfg(feature = "nomic-local")]
        EmbeddingProvider::Nomic => Ok(Box::new(NomicLocalEmbeddingClient::new(
            config.embedding_dimension,
        )?)),
        #[cfg(not(feature = "nomic-local"))]
        EmbeddingProvider::Nomic => Err(EmbeddingError::NotInitialized(
            "nomic-local feature not enabled".into(),
        )),
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
