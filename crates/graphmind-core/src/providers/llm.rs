//! Chat-completion LLM client with lenient JSON-mode parsing
//!
//! Wraps `async-openai`'s chat-completion endpoint. Per-request timeout
//! (default 30s) and bounded retry (default 1) per spec.md §5. JSON
//! parsing never panics on malformed output — it degrades to a typed
//! [`ParseResult::Error`] the way spec.md §9 prescribes in place of the
//! original implementation's duck-typed parse.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm returned no choices")]
    EmptyResponse,
}

/// The outcome of attempting to parse an LLM's JSON-mode response into
/// a strongly-typed prompt result. Every downstream consumer handles
/// both arms explicitly — a parse failure is data, never a panic.
#[derive(Debug)]
pub enum ParseResult<T> {
    Parsed(T),
    Error(ParseError),
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub raw: String,
}

impl<T> ParseResult<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            ParseResult::Parsed(v) => Some(v),
            ParseResult::Error(_) => None,
        }
    }
}

/// Strip a single leading/trailing markdown code fence (```json ... ```
/// or ``` ... ```) around an LLM response, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\r', '\n']);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    trimmed
}

/// Parse an LLM's textual response into `T`, tolerating surrounding
/// prose and fenced code blocks. Never panics.
pub fn parse_lenient_json<T: DeserializeOwned>(raw: &str) -> ParseResult<T> {
    let cleaned = strip_code_fence(raw);
    match serde_json::from_str::<T>(cleaned) {
        Ok(value) => ParseResult::Parsed(value),
        Err(e) => ParseResult::Error(ParseError {
            message: e.to_string(),
            raw: raw.to_string(),
        }),
    }
}

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, timeout: Duration, max_retries: u32, api_base: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model,
            timeout,
            max_retries,
        }
    }

    /// Issue a single chat-completion call at `temperature = 0`,
    /// optionally in JSON-object response-format mode, honoring the
    /// configured timeout and bounded retry.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| LlmError::Request(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| LlmError::Request(e.to_string()))?
                .into(),
        ];

        let mut attempt = 0;
        loop {
            let mut builder = CreateChatCompletionRequestArgs::default();
            builder
                .model(&self.model)
                .temperature(0.0)
                .messages(messages.clone());
            if json_mode {
                builder.response_format(ResponseFormat::JsonObject);
            }
            let request = builder.build().map_err(|e| LlmError::Request(e.to_string()))?;

            let call = self.client.chat().create(request);
            let result = tokio::time::timeout(self.timeout, call).await;

            match result {
                Ok(Ok(response)) => {
                    return response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or(LlmError::EmptyResponse);
                }
                Ok(Err(e)) if attempt < self.max_retries => {
                    tracing::warn!(attempt, error = %e, "llm call failed, retrying");
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(LlmError::Request(e.to_string())),
                Err(_) if attempt < self.max_retries => {
                    tracing::warn!(attempt, "llm call timed out, retrying");
                    attempt += 1;
                }
                Err(_) => return Err(LlmError::Timeout(self.timeout)),
            }
        }
    }
}
