//! OpenAI API Provider
//!
//! This module implements the LLMClient trait for OpenAI's chat completions
//! API. The wire handling lives in [`ChatCompletions`], which the LM Studio
//! provider reuses since it speaks the same protocol.

use crate::error::{CallContext, Result};
use crate::llm::client::{api_error_message, LLMHttpClient};
use crate::llm::provider::{ClientParams, GenerationOptions, LLMClient, SamplingDefaults, TextStream};
use crate::llm::stream::{text_stream, ChunkEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

/// OpenAI API base URL
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Model used when none is configured
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// OpenAI-compatible `/chat/completions` client
pub(crate) struct ChatCompletions {
    /// Provider name reported in errors and logs
    provider: &'static str,
    /// API key for authentication
    api_key: Option<String>,
    /// Model to use
    model: String,
    /// Base URL, without trailing slash
    base_url: String,
    /// Whether requests are refused without a key
    require_key: bool,
    /// HTTP client for making requests
    client: LLMHttpClient,
    /// Sampling defaults
    defaults: SamplingDefaults,
    /// Extra request fields
    extra_params: HashMap<String, Value>,
}

impl ChatCompletions {
    pub(crate) fn new(
        provider: &'static str,
        params: &ClientParams,
        default_model: &str,
        default_base_url: &str,
        require_key: bool,
    ) -> Result<Self> {
        let model = params
            .model_name
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());
        let base_url = params
            .endpoint
            .as_deref()
            .unwrap_or(default_base_url)
            .trim_end_matches('/')
            .to_string();
        let client = LLMHttpClient::new()
            .map_err(|e| e.with_context(&CallContext::new(provider, model.as_str())))?;

        Ok(Self {
            provider,
            api_key: params.api_key.clone(),
            extra_params: params.passthrough_params(provider),
            defaults: params.defaults,
            model,
            base_url,
            require_key,
            client,
        })
    }

    pub(crate) fn provider(&self) -> &str {
        self.provider
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn context(&self) -> CallContext {
        CallContext::new(self.provider, self.model.as_str())
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, prompt: &'a str, sampling: &SamplingDefaults, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            stream,
            extra: &self.extra_params,
        }
    }

    fn headers(&self, context: &CallContext) -> Result<reqwest::header::HeaderMap> {
        if self.require_key && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(context.generation("API key not configured", None));
        }
        LLMHttpClient::build_headers(self.api_key.as_deref()).map_err(|e| e.with_context(context))
    }

    /// Send a non-streaming request and return the answer text
    pub(crate) async fn complete(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<String> {
        let context = self.context();
        let headers = self.headers(&context)?;
        let sampling = self.defaults.resolve(options);
        let request = self.build_request(prompt, &sampling, false);

        debug!(provider = self.provider, model = %self.model, prompt_len = prompt.len(), "Generating");
        let response_text = self
            .client
            .post_json(&self.url(), headers, &request, sampling.timeout)
            .await
            .map_err(|e| e.with_context(&context))?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| context.generation(format!("Failed to parse response: {}", e), None))?;

        extract_content(&response).ok_or_else(|| context.generation("response contained no choices", None))
    }

    /// Send a streaming request and adapt its SSE body
    pub(crate) async fn stream(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<TextStream> {
        let context = self.context();
        let headers = self.headers(&context)?;
        let sampling = self.defaults.resolve(options);
        let request = self.build_request(prompt, &sampling, true);
        let deadline = Instant::now() + sampling.timeout;

        debug!(provider = self.provider, model = %self.model, prompt_len = prompt.len(), "Streaming");
        let bytes = self
            .client
            .post_stream(&self.url(), headers, &request, deadline, sampling.timeout)
            .await
            .map_err(|e| e.with_context(&context))?;

        Ok(text_stream(bytes, parse_stream_chunk, deadline, sampling.timeout, context))
    }
}

/// Text of the first choice
fn extract_content(response: &ChatResponse) -> Option<String> {
    response
        .choices
        .first()
        .map(|choice| choice.message.content.clone().unwrap_or_default())
}

/// Parse one `data:` payload of an OpenAI-compatible stream
pub(crate) fn parse_stream_chunk(data: &str) -> std::result::Result<ChunkEvent, String> {
    if data.trim() == "[DONE]" {
        return Ok(ChunkEvent::Done);
    }

    let value: Value = serde_json::from_str(data).map_err(|e| format!("malformed stream chunk: {}", e))?;
    if value.get("error").is_some() {
        return Err(api_error_message(data));
    }

    let chunk: ChatStreamChunk =
        serde_json::from_value(value).map_err(|e| format!("malformed stream chunk: {}", e))?;
    // Only the first choice, matching what `complete` returns.
    let text: String = chunk
        .choices
        .iter()
        .filter(|choice| choice.index == 0)
        .filter_map(|choice| choice.delta.content.as_deref())
        .collect();

    if text.is_empty() {
        Ok(ChunkEvent::Skip)
    } else {
        Ok(ChunkEvent::Text(text))
    }
}

/// OpenAI GPT API provider
pub struct OpenAIProvider {
    api: ChatCompletions,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    ///
    /// # Arguments
    /// * `params` - Model (defaults to gpt-3.5-turbo), key, optional base URL
    ///   override and extra request fields
    pub fn new(params: ClientParams) -> Result<Self> {
        Ok(Self {
            api: ChatCompletions::new("OpenAI", &params, DEFAULT_MODEL, OPENAI_API_BASE, true)?,
        })
    }
}

#[async_trait]
impl LLMClient for OpenAIProvider {
    async fn generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<String> {
        self.api.complete(prompt, options).await
    }

    async fn stream_generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<TextStream> {
        self.api.stream(prompt, options).await
    }

    fn provider_name(&self) -> &str {
        self.api.provider()
    }

    fn model_name(&self) -> &str {
        self.api.model()
    }

    fn api_key(&self) -> Option<&str> {
        self.api.api_key()
    }

    fn endpoint(&self) -> &str {
        self.api.base_url()
    }
}

/// Chat completions request format
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(flatten)]
    extra: &'a HashMap<String, Value>,
}

/// Chat message format
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completions response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Choice in a response
#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

/// Message in a response
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One streamed chunk
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}
