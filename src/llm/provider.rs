//! LLM Client Trait
//!
//! This module defines the trait-based abstraction every provider implements,
//! the per-call generation options, and the construction parameters shared by
//! all providers.

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// Lazy, finite sequence of text chunks
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Per-call overrides. Never stored on the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Temperature (higher = more random)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Deadline for the whole call (or the whole stream)
    pub timeout: Option<Duration>,
}

impl GenerationOptions {
    /// Create empty options (client defaults apply)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Sampling values a client falls back to when a call does not override them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: crate::config::DEFAULT_TEMPERATURE,
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SamplingDefaults {
    /// Merge call options over these defaults
    pub fn resolve(&self, options: Option<&GenerationOptions>) -> SamplingDefaults {
        SamplingDefaults {
            temperature: options.and_then(|o| o.temperature).unwrap_or(self.temperature),
            max_tokens: options.and_then(|o| o.max_tokens).unwrap_or(self.max_tokens),
            timeout: options.and_then(|o| o.timeout).unwrap_or(self.timeout),
        }
    }
}

/// Request fields a client controls itself; extra params may not shadow them
pub const RESERVED_PARAMS: [&str; 5] = ["model", "messages", "stream", "temperature", "max_tokens"];

/// Construction parameters for a provider
#[derive(Clone, Default)]
pub struct ClientParams {
    /// Model identifier; each provider has its own default
    pub model_name: Option<String>,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Base URL; hosted providers fall back to their public API
    pub endpoint: Option<String>,
    /// Provider-specific request fields merged into every request body
    pub extra_params: HashMap<String, Value>,
    /// Sampling and timeout defaults
    pub defaults: SamplingDefaults,
}

impl std::fmt::Debug for ClientParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientParams")
            .field("model_name", &self.model_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("extra_params", &self.extra_params)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ClientParams {
    /// Create empty parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a provider-specific request field
    pub fn with_extra_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    /// Set sampling defaults
    pub fn with_defaults(mut self, defaults: SamplingDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Extra params minus any key that would shadow a controlled field
    pub(crate) fn passthrough_params(&self, provider: &str) -> HashMap<String, Value> {
        self.extra_params
            .iter()
            .filter(|(key, _)| {
                let reserved = RESERVED_PARAMS.contains(&key.as_str());
                if reserved {
                    warn!(provider, param = %key, "Ignoring extra param that shadows a request field");
                }
                !reserved
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Trait for LLM clients
///
/// One implementation per provider. Implementations hold no per-call state,
/// so a single instance can serve concurrent callers.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a complete response for a prompt
    ///
    /// # Arguments
    /// * `prompt` - User prompt
    /// * `options` - Per-call overrides
    ///
    /// # Returns
    /// The response text
    async fn generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<String>;

    /// Generate a response as a stream of text chunks
    ///
    /// The chunks concatenate to the full answer. Every call issues a fresh
    /// request; dropping the stream early releases the connection. Providers
    /// without native streaming get a single-chunk stream.
    async fn stream_generate(
        &self,
        prompt: &str,
        options: Option<&GenerationOptions>,
    ) -> Result<TextStream> {
        stream_from_generate(self, prompt, options).await
    }

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name requests are sent with
    fn model_name(&self) -> &str;

    /// Get the configured API key
    fn api_key(&self) -> Option<&str>;

    /// Get the base URL requests are sent to
    fn endpoint(&self) -> &str;

    /// Check if the client has an API key configured
    fn has_api_key(&self) -> bool {
        self.api_key().is_some_and(|k| !k.is_empty())
    }
}

/// Run one `generate` call and yield its text as a single chunk.
///
/// Fallback for clients with no incremental streaming.
pub async fn stream_from_generate<C>(
    client: &C,
    prompt: &str,
    options: Option<&GenerationOptions>,
) -> Result<TextStream>
where
    C: LLMClient + ?Sized,
{
    let text = client.generate(prompt, options).await?;
    Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
}

/// Drain a stream into one string
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    use futures::StreamExt;

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmHubError;
    use futures::StreamExt;

    /// Client that only knows how to answer in one piece
    struct EchoClient;

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn generate(&self, prompt: &str, options: Option<&GenerationOptions>) -> Result<String> {
            let resolved = SamplingDefaults::default().resolve(options);
            Ok(format!("echo[{}]: {}", resolved.max_tokens, prompt))
        }

        fn provider_name(&self) -> &str {
            "Echo"
        }

        fn model_name(&self) -> &str {
            "echo-1"
        }

        fn api_key(&self) -> Option<&str> {
            None
        }

        fn endpoint(&self) -> &str {
            "memory://echo"
        }
    }

    struct FailingClient;

    #[async_trait]
    impl LLMClient for FailingClient {
        async fn generate(&self, _prompt: &str, _options: Option<&GenerationOptions>) -> Result<String> {
            Err(crate::error::CallContext::new("Failing", "none").generation("boom", Some(500)))
        }

        fn provider_name(&self) -> &str {
            "Failing"
        }

        fn model_name(&self) -> &str {
            "none"
        }

        fn api_key(&self) -> Option<&str> {
            Some("")
        }

        fn endpoint(&self) -> &str {
            "memory://failing"
        }
    }

    #[test]
    fn test_generation_options_builder() {
        let options = GenerationOptions::new()
            .with_max_tokens(2048)
            .with_temperature(0.5)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(options.max_tokens, Some(2048));
        assert_eq!(options.temperature, Some(0.5));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_resolve_overrides_only_given_fields() {
        let defaults = SamplingDefaults {
            temperature: 0.7,
            max_tokens: 1500,
            timeout: Duration::from_secs(60),
        };
        let options = GenerationOptions::new().with_max_tokens(10);
        let resolved = defaults.resolve(Some(&options));

        assert_eq!(resolved.max_tokens, 10);
        assert_eq!(resolved.temperature, 0.7);
        assert_eq!(resolved.timeout, Duration::from_secs(60));
        assert_eq!(defaults.resolve(None), defaults);
    }

    #[test]
    fn test_passthrough_drops_reserved_keys() {
        let params = ClientParams::new()
            .with_extra_param("top_p", serde_json::json!(0.9))
            .with_extra_param("model", serde_json::json!("sneaky"))
            .with_extra_param("stream", serde_json::json!(true));

        let extras = params.passthrough_params("Test");
        assert_eq!(extras.len(), 1);
        assert_eq!(extras.get("top_p"), Some(&serde_json::json!(0.9)));
    }

    #[test]
    fn test_client_params_debug_redacts_key() {
        let params = ClientParams::new().with_api_key("sk-secret");
        assert!(!format!("{:?}", params).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_default_stream_is_single_chunk_matching_generate() {
        let client = EchoClient;
        let options = GenerationOptions::new().with_max_tokens(42);

        let full = client.generate("hello", Some(&options)).await.unwrap();
        let chunks: Vec<String> = client
            .stream_generate("hello", Some(&options))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks.concat(), full);
        assert_eq!(full, "echo[42]: hello");
    }

    #[tokio::test]
    async fn test_default_stream_surfaces_generate_error() {
        let client: Box<dyn LLMClient> = Box::new(FailingClient);
        match client.stream_generate("hi", None).await {
            Err(LlmHubError::Generation { provider, status, .. }) => {
                assert_eq!(provider, "Failing");
                assert_eq!(status, Some(500));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_collect_stream() {
        let stream: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        assert_eq!(tokio_test::block_on(collect_stream(stream)).unwrap(), "Hello");
    }

    #[test]
    fn test_has_api_key() {
        assert!(!EchoClient.has_api_key());
        assert!(!FailingClient.has_api_key());
    }
}
