//! Anthropic Claude API Provider
//!
//! This module implements the LLMClient trait for Anthropic's Messages API.

use crate::error::{CallContext, Result};
use crate::llm::client::{api_error_message, LLMHttpClient};
use crate::llm::provider::{ClientParams, GenerationOptions, LLMClient, SamplingDefaults, TextStream};
use crate::llm::stream::{text_stream, ChunkEvent};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

/// Anthropic API base URL
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// Model used when none is configured
const DEFAULT_MODEL: &str = "claude-2";

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude API provider
pub struct AnthropicProvider {
    /// API key for authentication
    api_key: Option<String>,
    /// Model to use (e.g., "claude-3-5-sonnet-20241022")
    model: String,
    /// Base URL, without trailing slash
    base_url: String,
    /// HTTP client for making requests
    client: LLMHttpClient,
    /// API version
    version: String,
    /// Sampling defaults
    defaults: SamplingDefaults,
    /// Extra request fields
    extra_params: HashMap<String, Value>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    ///
    /// # Arguments
    /// * `params` - Model (defaults to claude-2), key, optional base URL
    ///   override and extra request fields
    pub fn new(params: ClientParams) -> Result<Self> {
        let model = params
            .model_name
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let client = LLMHttpClient::new()
            .map_err(|e| e.with_context(&CallContext::new("Anthropic", model.as_str())))?;

        Ok(Self {
            api_key: params.api_key.clone(),
            base_url: params
                .endpoint
                .as_deref()
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            extra_params: params.passthrough_params("Anthropic"),
            defaults: params.defaults,
            version: ANTHROPIC_VERSION.to_string(),
            model,
            client,
        })
    }

    /// Set the API version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    fn context(&self) -> CallContext {
        CallContext::new("Anthropic", self.model.as_str())
    }

    fn url(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    /// Build headers for Anthropic API
    fn build_headers(&self, context: &CallContext) -> Result<HeaderMap> {
        let api_key = match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Err(context.generation("API key not configured", None)),
        };

        LLMHttpClient::build_headers(None)
            .and_then(|h| LLMHttpClient::add_header(h, "x-api-key", api_key))
            .and_then(|h| LLMHttpClient::add_header(h, "anthropic-version", &self.version))
            .map_err(|e| e.with_context(context))
    }

    fn build_request<'a>(&'a self, prompt: &'a str, sampling: &SamplingDefaults, stream: bool) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            stream,
            extra: &self.extra_params,
        }
    }
}

#[async_trait]
impl LLMClient for AnthropicProvider {
    /// Generate a response from the Claude API
    async fn generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<String> {
        let context = self.context();
        let headers = self.build_headers(&context)?;
        let sampling = self.defaults.resolve(options);
        let request = self.build_request(prompt, &sampling, false);

        debug!(model = %self.model, prompt_len = prompt.len(), "Generating with Anthropic");
        let response_text = self
            .client
            .post_json(&self.url(), headers, &request, sampling.timeout)
            .await
            .map_err(|e| e.with_context(&context))?;

        let anthropic_response: AnthropicResponse = serde_json::from_str(&response_text)
            .map_err(|e| context.generation(format!("Failed to parse response: {}", e), None))?;

        Ok(extract_content(&anthropic_response))
    }

    /// Stream a response from the Claude API
    async fn stream_generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<TextStream> {
        let context = self.context();
        let headers = self.build_headers(&context)?;
        let sampling = self.defaults.resolve(options);
        let request = self.build_request(prompt, &sampling, true);
        let deadline = Instant::now() + sampling.timeout;

        debug!(model = %self.model, prompt_len = prompt.len(), "Streaming with Anthropic");
        let bytes = self
            .client
            .post_stream(&self.url(), headers, &request, deadline, sampling.timeout)
            .await
            .map_err(|e| e.with_context(&context))?;

        Ok(text_stream(bytes, parse_stream_event, deadline, sampling.timeout, context))
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// Concatenate all text blocks
fn extract_content(response: &AnthropicResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.type_ == "text")
        .filter_map(|block| block.text.as_deref())
        .collect()
}

/// Parse one `data:` payload of a Messages API stream
fn parse_stream_event(data: &str) -> std::result::Result<ChunkEvent, String> {
    let event: StreamEvent = serde_json::from_str(data).map_err(|e| format!("malformed stream event: {}", e))?;

    match event.type_.as_str() {
        "content_block_delta" => match event.delta {
            Some(StreamDelta { type_, text: Some(text) }) if type_ == "text_delta" && !text.is_empty() => {
                Ok(ChunkEvent::Text(text))
            }
            _ => Ok(ChunkEvent::Skip),
        },
        "message_stop" => Ok(ChunkEvent::Done),
        "error" => Err(api_error_message(data)),
        _ => Ok(ChunkEvent::Skip),
    }
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(flatten)]
    extra: &'a HashMap<String, Value>,
}

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Content block in response
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    type_: String,
    text: Option<String>,
}

/// One streamed event
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    type_: String,
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    type_: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmHubError;

    #[test]
    fn test_anthropic_provider_creation() {
        let provider = AnthropicProvider::new(ClientParams::new().with_api_key("test-key")).unwrap();
        assert_eq!(provider.model_name(), "claude-2");
        assert_eq!(provider.provider_name(), "Anthropic");
        assert_eq!(provider.endpoint(), ANTHROPIC_API_BASE);
        assert_eq!(provider.version, ANTHROPIC_VERSION);
        assert!(provider.has_api_key());
    }

    #[test]
    fn test_with_version() {
        let provider = AnthropicProvider::new(ClientParams::new().with_model("claude-3-5-haiku-latest"))
            .unwrap()
            .with_version("2024-01-01");
        assert_eq!(provider.version, "2024-01-01");
        assert_eq!(provider.model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_headers() {
        let provider = AnthropicProvider::new(ClientParams::new().with_api_key("sk-ant-1")).unwrap();
        let headers = provider.build_headers(&provider.context()).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-1");
        assert_eq!(headers.get("anthropic-version").unwrap(), ANTHROPIC_VERSION);
        assert!(headers.get("authorization").is_none());
    }

    #[test]
    fn test_headers_require_key() {
        let provider = AnthropicProvider::new(ClientParams::new()).unwrap();
        let err = provider.build_headers(&provider.context()).unwrap_err();
        assert!(matches!(err, LlmHubError::Generation { ref provider, .. } if provider == "Anthropic"));
    }

    #[test]
    fn test_request_serialization() {
        let provider = AnthropicProvider::new(
            ClientParams::new().with_extra_param("top_k", serde_json::json!(5)),
        )
        .unwrap();
        let sampling = provider.defaults.resolve(Some(&GenerationOptions::new().with_max_tokens(64)));
        let body = serde_json::to_value(provider.build_request("Hello", &sampling, false)).unwrap();

        assert_eq!(body["model"], "claude-2");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert_eq!(body["top_k"], 5);
    }

    #[test]
    fn test_extract_content_joins_text_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"id":"msg_1","type":"message","role":"assistant","content":[{"type":"text","text":"Hello"},{"type":"tool_use","id":"t","name":"x","input":{}},{"type":"text","text":" there"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(extract_content(&response), "Hello there");
    }

    #[test]
    fn test_parse_stream_event() {
        let delta = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(parse_stream_event(delta), Ok(ChunkEvent::Text("Hi".to_string())));

        let json_delta = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(parse_stream_event(json_delta), Ok(ChunkEvent::Skip));

        let start = r#"{"type":"message_start","message":{"id":"msg_1","content":[]}}"#;
        assert_eq!(parse_stream_event(start), Ok(ChunkEvent::Skip));

        assert_eq!(parse_stream_event(r#"{"type":"ping"}"#), Ok(ChunkEvent::Skip));
        assert_eq!(parse_stream_event(r#"{"type":"message_stop"}"#), Ok(ChunkEvent::Done));

        let error = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(parse_stream_event(error), Err("Overloaded".to_string()));
    }
}
