//! MCP Server Core
//!
//! Handles the main MCP server logic, routing requests to the four
//! tool handlers (spec.md §6).

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;
use graphmind_core::graph::GraphClient;
use graphmind_core::providers::embeddings::EmbeddingClient;
use graphmind_core::providers::llm::LlmClient;
use graphmind_core::write::WritePipeline;

/// MCP Server implementation.
pub struct McpServer {
    graph: Arc<dyn GraphClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    llm: Arc<LlmClient>,
    pipeline: Arc<WritePipeline>,
    initialized: bool,
}

impl McpServer {
    pub fn new(graph: Arc<dyn GraphClient>, embeddings: Arc<dyn EmbeddingClient>, llm: Arc<LlmClient>, pipeline: Arc<WritePipeline>) -> Self {
        Self { graph, embeddings, llm, pipeline, initialized: false }
    }

    /// Handle an incoming JSON-RPC request.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("Handling request: {}", request.method);

        if !self.initialized && request.method != "initialize" && request.method != "notifications/initialized" {
            warn!("Rejecting request '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(request.id, JsonRpcError::server_not_initialized()));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => Ok(serde_json::to_value(crate::protocol::messages::ListResourcesResult { resources: vec![] }).unwrap()),
            "resources/read" => Err(JsonRpcError::resource_not_found("no resources are exposed")),
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("Unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(&mut self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let negotiated_version = if request.protocol_version.as_str() < MCP_VERSION {
            info!("Client requested older protocol version {}, using it", request.protocol_version);
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("MCP session initialized with protocol version {}", negotiated_version);

        let result = InitializeResult {
            protocol_version: negotiated_version,
            server_info: ServerInfo { name: "graphmind".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
                resources: None,
                prompts: None,
            },
            instructions: Some(
                "graphmind is a long-term memory store for agents. Use add_memory to record \
                 facts, search_memory to recall or browse them, update_memory to supersede a \
                 fact that has changed, and entity to resolve an entity id before referencing \
                 it elsewhere."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "add_memory".to_string(),
                description: Some("Ingest one fact, or an array of facts, into the caller's memory graph.".to_string()),
                input_schema: tools::add_memory::schema(),
            },
            ToolDescription {
                name: "search_memory".to_string(),
                description: Some(
                    "Hybrid (keyword + vector) search over the caller's memories, or chronological browsing when no query is given."
                        .to_string(),
                ),
                input_schema: tools::search_memory::schema(),
            },
            ToolDescription {
                name: "update_memory".to_string(),
                description: Some("Supersede an existing memory, identified by id or a content fragment, with new text.".to_string()),
                input_schema: tools::update_memory::schema(),
            },
            ToolDescription {
                name: "entity".to_string(),
                description: Some("Resolve an entity by name to a stable entity id, creating it if it does not already exist.".to_string()),
                input_schema: tools::entity::schema(),
            },
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "add_memory" => tools::add_memory::execute(&self.pipeline, request.arguments).await,
            "search_memory" => tools::search_memory::execute(self.graph.as_ref(), self.embeddings.as_ref(), request.arguments).await,
            "update_memory" => tools::update_memory::execute(&self.pipeline, self.graph.as_ref(), request.arguments).await,
            "entity" => tools::entity::execute(self.graph.as_ref(), self.embeddings.as_ref(), self.llm.as_ref(), request.arguments).await,
            name => return Err(JsonRpcError::method_not_found_with_message(&format!("Unknown tool: {}", name))),
        };

        let response = match result {
            Ok(content) => {
                let call_result = CallToolResult {
                    content: vec![crate::protocol::messages::ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::to_string_pretty(&content).unwrap_or_else(|_| content.to_string()),
                    }],
                    is_error: Some(false),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
            Err(e) => {
                let call_result = CallToolResult {
                    content: vec![crate::protocol::messages::ToolResultContent {
                        content_type: "text".to_string(),
                        text: serde_json::json!({ "error": e }).to_string(),
                    }],
                    is_error: Some(true),
                };
                serde_json::to_value(call_result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
            }
        };

        response
    }
}
