//! graphmind MCP Server
//!
//! A Model Context Protocol server giving LLM agents a per-user,
//! bi-temporal long-term memory graph: ingest facts, resolve entities,
//! deduplicate against what's already known, and retrieve by hybrid
//! (keyword + vector) search.

mod protocol;
mod server;
mod tools;

use std::io;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use graphmind_core::cache::PairCache;
use graphmind_core::config::Config;
use graphmind_core::graph::{ensure_schema, ensure_vector_indexes, GraphClient, Neo4jClient};
use graphmind_core::providers::embeddings;
use graphmind_core::providers::llm::LlmClient;
use graphmind_core::write::WritePipeline;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments. Exits the process if `--help` or
/// `--version` is requested; any other argument is an error.
fn parse_args() {
    let args: Vec<String> = std::env::args().collect();
    for arg in &args[1..] {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("graphmind-mcp v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Agent-native long-term memory server using the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    graphmind-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!();
                println!("ENVIRONMENT:");
                println!("    GRAPH_URI, GRAPH_USER, GRAPH_PASSWORD, GRAPH_DATABASE   Neo4j connection");
                println!("    EMBEDDING_PROVIDER     intelli | azure | nomic (default: intelli)");
                println!("    LLM_API_KEY             API key for the chat-completion provider");
                println!("    LLM_API_BASE            Override chat-completion endpoint (Azure/self-hosted gateways)");
                println!("    RUST_LOG                Log level filter (e.g., debug, info, warn, error)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("graphmind-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("error: unknown argument '{}'", other);
                eprintln!("Try 'graphmind-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
    }
}

#[tokio::main]
async fn main() {
    parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("graphmind MCP server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env());

    let graph: Arc<dyn GraphClient> = match Neo4jClient::connect(&config.graph).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("failed to connect to graph database at {}: {}", config.graph.uri, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = ensure_schema(graph.as_ref()).await {
        error!("failed to bootstrap graph schema: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = ensure_vector_indexes(graph.as_ref()).await {
        error!("failed to verify vector indexes: {}", e);
        std::process::exit(1);
    }
    info!("graph schema ready");

    let embeddings: Arc<dyn embeddings::EmbeddingClient> = match embeddings::build_from_config(&config) {
        Ok(client) => Arc::from(client),
        Err(e) => {
            error!("failed to initialize embedding client: {}", e);
            std::process::exit(1);
        }
    };

    let llm = Arc::new(LlmClient::new(
        config.llm_api_key.clone().unwrap_or_default(),
        std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        config.llm_timeout,
        config.llm_max_retries,
        config.llm_api_base.clone(),
    ));

    let cache = Arc::new(PairCache::new(config.pair_cache_max_entries));
    let pipeline = Arc::new(WritePipeline::new(graph.clone(), embeddings.clone(), llm.clone(), cache, config.clone()));

    let server = McpServer::new(graph, embeddings, llm, pipeline);
    let transport = StdioTransport::new();

    info!("starting MCP server on stdio...");
    if let Err(e) = transport.run(server).await {
        error!("server error: {}", e);
        std::process::exit(1);
    }

    info!("graphmind MCP server shutting down");
}
