//! Typed configuration
//!
//! A single record built once at startup from env + defaults. Nothing
//! downstream re-reads `std::env` mid-request except the two call sites
//! spec'd explicitly: active embedding provider detection (dedup
//! threshold selection, §4.3) and entity-resolver provider detection
//! (§4.4) both consult [`Config::embedding_provider`], which is itself
//! resolved once here.

use std::time::Duration;

/// Closed variant over the supported embedding providers. Represented as
/// a tagged enum rather than a bare string so provider dispatch is
/// exhaustively checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Intelli,
    Azure,
    Nomic,
}

impl EmbeddingProvider {
    fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "azure" => Self::Azure,
            "nomic" => Self::Nomic,
            _ => Self::Intelli,
        }
    }
}

/// Dedup threshold configuration. Independent per provider by
/// construction — there is no shared "the" threshold field, so a change
/// to [`DedupThresholds::azure`] cannot leak into the intelli path and
/// vice versa (tested by [`DedupThresholds::for_provider`]).
#[derive(Debug, Clone, Copy)]
pub struct DedupThresholds {
    pub azure: f32,
    pub intelli: f32,
    pub fallback: f32,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self {
            azure: 0.55,
            intelli: 0.55,
            fallback: 0.75,
        }
    }
}

impl DedupThresholds {
    pub fn for_provider(&self, provider: EmbeddingProvider) -> f32 {
        match provider {
            EmbeddingProvider::Azure => self.azure,
            EmbeddingProvider::Intelli => self.intelli,
            EmbeddingProvider::Nomic => self.fallback,
        }
    }
}

/// Graph database connection parameters.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Process-wide configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub dedup_enabled: bool,
    pub dedup_thresholds: DedupThresholds,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_dimension: usize,
    pub extraction_drain_timeout: Duration,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,
    pub pair_cache_max_entries: usize,
    pub graph: GraphConfig,
    pub llm_api_key: Option<String>,
    /// Override for the chat-completion endpoint base URL — unset means
    /// the provider's default (OpenAI). Lets the client point at an
    /// Azure-compatible gateway or a self-hosted OpenAI-compatible server.
    pub llm_api_base: Option<String>,
    pub embedding_api_key: Option<String>,
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// the documented defaults (spec.md §6) for anything unset.
    pub fn from_env() -> Self {
        let env_f32 = |key: &str, default: f32| -> f32 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_bool = |key: &str, default: bool| -> bool {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        let default_thresholds = DedupThresholds::default();

        Self {
            dedup_enabled: env_bool("DEDUP_ENABLED", true),
            dedup_thresholds: DedupThresholds {
                azure: env_f32("DEDUP_AZURE_THRESHOLD", default_thresholds.azure),
                intelli: env_f32("DEDUP_INTELLI_THRESHOLD", default_thresholds.intelli),
                fallback: env_f32("DEDUP_THRESHOLD", default_thresholds.fallback),
            },
            embedding_provider: EmbeddingProvider::from_env_str(
                &std::env::var("EMBEDDING_PROVIDER").unwrap_or_default(),
            ),
            embedding_dimension: std::env::var("EMBEDDING_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1536),
            extraction_drain_timeout: Duration::from_millis(env_u64(
                "EXTRACTION_DRAIN_TIMEOUT_MS",
                3000,
            )),
            llm_timeout: Duration::from_millis(env_u64("LLM_TIMEOUT_MS", 30_000)),
            llm_max_retries: env_u64("LLM_MAX_RETRIES", 1) as u32,
            pair_cache_max_entries: env_u64("PAIR_CACHE_MAX_ENTRIES", 10_000) as usize,
            graph: GraphConfig {
                uri: std::env::var("GRAPH_URI").unwrap_or_else(|_| "bolt://localhost:7687".into()),
                user: std::env::var("GRAPH_USER").unwrap_or_else(|_| "neo4j".into()),
                password: std::env::var("GRAPH_PASSWORD").unwrap_or_default(),
                database: std::env::var("GRAPH_DATABASE").unwrap_or_else(|_| "neo4j".into()),
            },
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            llm_api_base: std::env::var("LLM_API_BASE").ok(),
            embedding_api_key: std::env::var("EMBEDDING_API_KEY").ok(),
        }
    }
}
