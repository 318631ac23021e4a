//! LM Studio Provider
//!
//! This module implements the LLMClient trait for LM Studio, or any other
//! locally hosted server exposing the OpenAI chat completions API.

use crate::error::Result;
use crate::llm::provider::{ClientParams, GenerationOptions, LLMClient, TextStream};
use crate::llm::providers::openai::ChatCompletions;
use async_trait::async_trait;

/// Default local server base URL
const LMSTUDIO_API_BASE: &str = "http://localhost:1234/v1";

/// Model sentinel; the server resolves whichever model it has loaded
const DEFAULT_MODEL: &str = "local-model";

/// Key sent when none is configured
const DEFAULT_API_KEY: &str = "lm-studio";

/// LM Studio provider
pub struct LMStudioProvider {
    api: ChatCompletions,
}

impl LMStudioProvider {
    /// Create a new LM Studio provider
    ///
    /// # Arguments
    /// * `params` - Model (defaults to `local-model`), key (defaults to a
    ///   dummy), endpoint (defaults to `http://localhost:1234/v1`)
    pub fn new(mut params: ClientParams) -> Result<Self> {
        if params.api_key.is_none() {
            params.api_key = Some(DEFAULT_API_KEY.to_string());
        }

        Ok(Self {
            api: ChatCompletions::new("LMStudio", &params, DEFAULT_MODEL, LMSTUDIO_API_BASE, false)?,
        })
    }
}

#[async_trait]
impl LLMClient for LMStudioProvider {
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
