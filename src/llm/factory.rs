//! Provider Factory
//!
//! Builds the client for a provider from its section of [`AppSettings`].

use crate::config::{AppSettings, ProviderConfig, ProviderKind};
use crate::error::Result;
use crate::llm::provider::{ClientParams, LLMClient, SamplingDefaults};
use crate::llm::providers::{anthropic::AnthropicProvider, lmstudio::LMStudioProvider, openai::OpenAIProvider};
use std::time::Duration;
use tracing::{info, warn};

/// Create the client for the selected provider
pub fn create_client(settings: &AppSettings) -> Result<Box<dyn LLMClient>> {
    create_client_for(settings.selected_provider, settings)
}

/// Create the client named by a raw discriminator.
///
/// Unknown names fail with `UnsupportedProvider` before anything is built.
pub fn create_client_by_name(name: &str, settings: &AppSettings) -> Result<Box<dyn LLMClient>> {
    let kind: ProviderKind = name.parse()?;
    create_client_for(kind, settings)
}

/// Create the client for a specific provider
pub fn create_client_for(kind: ProviderKind, settings: &AppSettings) -> Result<Box<dyn LLMClient>> {
    let params = client_params(settings.provider(kind), settings.request_timeout);

    let client: Box<dyn LLMClient> = match kind {
        ProviderKind::OpenAI => Box::new(OpenAIProvider::new(params)?),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(params)?),
        ProviderKind::LMStudio => Box::new(LMStudioProvider::new(params)?),
    };

    info!(
        provider = client.provider_name(),
        model = client.model_name(),
        endpoint = client.endpoint(),
        "Created LLM client"
    );
    if !client.has_api_key() {
        warn!(provider = client.provider_name(), "No API key configured; requests will be refused");
    }

    Ok(client)
}

/// Translate a configuration section into construction parameters
pub fn client_params(config: &ProviderConfig, timeout: Duration) -> ClientParams {
    ClientParams {
        model_name: config.model.clone(),
        api_key: config.api_key.clone(),
        endpoint: config.endpoint.clone(),
        extra_params: Default::default(),
        defaults: SamplingDefaults {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SettingsSource, SELECTED_PROVIDER_VAR};
    use crate::error::LlmHubError;

    fn settings(pairs: &[(&str, &str)]) -> AppSettings {
        let source = pairs
            .iter()
            .fold(SettingsSource::new(), |source, (k, v)| source.with_env(*k, *v));
        AppSettings::from_source(&source).unwrap()
    }

    #[test]
    fn test_each_discriminator_builds_matching_client() {
        let settings = settings(&[
            ("DEFAULT_OPENAI_MODEL", "gpt-4o"),
            ("DEFAULT_ANTHROPIC_MODEL", "claude-3-opus-20240229"),
            ("DEFAULT_LMSTUDIO_MODEL", "llama-3.2-3b"),
        ]);

        for (kind, provider, model) in [
            (ProviderKind::OpenAI, "OpenAI", "gpt-4o"),
            (ProviderKind::Anthropic, "Anthropic", "claude-3-opus-20240229"),
            (ProviderKind::LMStudio, "LMStudio", "llama-3.2-3b"),
        ] {
            let client = create_client_for(kind, &settings).unwrap();
            assert_eq!(client.provider_name(), provider);
            assert_eq!(client.model_name(), model);
        }
    }

    #[test]
    fn test_defaults_when_models_unset() {
        let settings = settings(&[]);

        let expected = [
            (ProviderKind::OpenAI, "gpt-3.5-turbo"),
            (ProviderKind::Anthropic, "claude-2"),
            (ProviderKind::LMStudio, "local-model"),
        ];
        for (kind, model) in expected {
            assert_eq!(create_client_for(kind, &settings).unwrap().model_name(), model);
        }
    }

    #[test]
    fn test_create_client_uses_selected_provider() {
        let settings = settings(&[(SELECTED_PROVIDER_VAR, "anthropic"), ("ANTHROPIC_API_KEY", "sk-ant")]);
        let client = create_client(&settings).unwrap();
        assert_eq!(client.provider_name(), "Anthropic");
        assert_eq!(client.api_key(), Some("sk-ant"));
    }

    #[test]
    fn test_lmstudio_section_carries_endpoint_and_key() {
        let settings = settings(&[(SELECTED_PROVIDER_VAR, "lmstudio"), ("LMSTUDIO_API_ENDPOINT", "http://box:8080/v1")]);
        let client = create_client(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://box:8080/v1");
        assert_eq!(client.api_key(), Some("lm-studio-dummy-key"));
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let settings = settings(&[]);
        match create_client_by_name("grok", &settings) {
            Err(LlmHubError::UnsupportedProvider(name)) => assert_eq!(name, "grok"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(client) => panic!("built a client for grok: {}", client.provider_name()),
        }
    }

    #[test]
    fn test_by_name_accepts_known_names() {
        let settings = settings(&[]);
        assert_eq!(create_client_by_name("OpenAI", &settings).unwrap().provider_name(), "OpenAI");
        assert_eq!(create_client_by_name("local", &settings).unwrap().provider_name(), "LMStudio");
    }

    #[test]
    fn test_client_params_copy_sampling_defaults() {
        let settings = settings(&[("OPENAI_TEMPERATURE", "0.2"), ("OPENAI_MAX_TOKENS", "256")]);
        let params = client_params(&settings.openai, Duration::from_secs(5));
        assert_eq!(params.defaults.temperature, 0.2);
        assert_eq!(params.defaults.max_tokens, 256);
        assert_eq!(params.defaults.timeout, Duration::from_secs(5));
    }
}
