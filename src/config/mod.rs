//! Configuration module
//!
//! This module resolves provider selection, credentials and default
//! generation parameters from the environment and an optional env file.

pub mod source;

use crate::error::{LlmHubError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

pub use source::SettingsSource;

/// Discriminator variable
pub const SELECTED_PROVIDER_VAR: &str = "SELECTED_LLM_PROVIDER";

/// Default per-call deadline variable
pub const REQUEST_TIMEOUT_VAR: &str = "LLM_REQUEST_TIMEOUT_SECS";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default maximum output tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1500;

/// Default request timeout (in seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default OpenAI model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Default Anthropic model
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-2";

/// Default LM Studio key; local servers usually accept anything
pub const DEFAULT_LMSTUDIO_API_KEY: &str = "lm-studio-dummy-key";

/// Default LM Studio endpoint
pub const DEFAULT_LMSTUDIO_ENDPOINT: &str = "http://localhost:1234/v1";

/// The closed set of supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI hosted API
    OpenAI,
    /// Anthropic hosted API
    Anthropic,
    /// LM Studio or any OpenAI-compatible local server
    LMStudio,
}

impl ProviderKind {
    /// All providers, in discriminator order
    pub const ALL: [ProviderKind; 3] = [Self::OpenAI, Self::Anthropic, Self::LMStudio];

    /// Canonical discriminator value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::LMStudio => "lmstudio",
        }
    }

    /// Prefix of the provider's environment variables
    fn env_prefix(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::LMStudio => "LMSTUDIO",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmHubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" | "lm-studio" | "local" => Ok(Self::LMStudio),
            _ => Err(LlmHubError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Settings for one provider
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    /// API key (secret)
    pub api_key: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Endpoint URL (local server only)
    pub endpoint: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            endpoint: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// Keys never reach logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve one provider's section from a source
    fn resolve(kind: ProviderKind, source: &SettingsSource) -> Result<Self> {
        let prefix = kind.env_prefix();

        let (default_key, default_model, default_endpoint) = match kind {
            ProviderKind::OpenAI => (None, Some(DEFAULT_OPENAI_MODEL), None),
            ProviderKind::Anthropic => (None, Some(DEFAULT_ANTHROPIC_MODEL), None),
            ProviderKind::LMStudio => (
                Some(DEFAULT_LMSTUDIO_API_KEY),
                None,
                Some(DEFAULT_LMSTUDIO_ENDPOINT),
            ),
        };

        let api_key = source
            .get(&format!("{}_API_KEY", prefix))
            .or(default_key)
            .map(str::to_string);
        let model = source
            .get(&format!("DEFAULT_{}_MODEL", prefix))
            .or(default_model)
            .map(str::to_string);
        let endpoint = match kind {
            ProviderKind::LMStudio => source
                .get(&format!("{}_API_ENDPOINT", prefix))
                .or(default_endpoint)
                .map(|e| e.trim_end_matches('/').to_string()),
            _ => None,
        };

        let temperature_var = format!("{}_TEMPERATURE", prefix);
        let max_tokens_var = format!("{}_MAX_TOKENS", prefix);

        let temperature = match source.first_of(&[temperature_var.as_str(), "TEMPERATURE"]) {
            Some((field, raw)) => parse_temperature(&field, raw)?,
            None => DEFAULT_TEMPERATURE,
        };
        let max_tokens = match source.first_of(&[max_tokens_var.as_str(), "MAX_TOKENS"]) {
            Some((field, raw)) => parse_positive(&field, raw)?,
            None => DEFAULT_MAX_TOKENS,
        };

        Ok(Self {
            api_key,
            model,
            endpoint,
            temperature,
            max_tokens,
        })
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Application settings, resolved once and read-only afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    /// Provider that requests are routed to
    pub selected_provider: ProviderKind,
    /// OpenAI section
    pub openai: ProviderConfig,
    /// Anthropic section
    pub anthropic: ProviderConfig,
    /// LM Studio section
    pub lmstudio: ProviderConfig,
    /// Default per-call deadline
    pub request_timeout: Duration,
}

impl AppSettings {
    /// Resolve settings from the process environment and env file
    pub fn from_env() -> Result<Self> {
        Self::from_source(&SettingsSource::from_process()?)
    }

    /// Resolve settings from an explicit source
    pub fn from_source(source: &SettingsSource) -> Result<Self> {
        let selected_provider = match source.get(SELECTED_PROVIDER_VAR) {
            Some(raw) => raw.parse::<ProviderKind>().map_err(|_| {
                LlmHubError::config(
                    SELECTED_PROVIDER_VAR,
                    format!("unsupported provider '{}' (expected openai, anthropic or lmstudio)", raw),
                )
            })?,
            None => ProviderKind::OpenAI,
        };

        let request_timeout = match source.get(REQUEST_TIMEOUT_VAR) {
            Some(raw) => Duration::from_secs(parse_positive::<u64>(REQUEST_TIMEOUT_VAR, raw)?),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let settings = Self {
            selected_provider,
            openai: ProviderConfig::resolve(ProviderKind::OpenAI, source)?,
            anthropic: ProviderConfig::resolve(ProviderKind::Anthropic, source)?,
            lmstudio: ProviderConfig::resolve(ProviderKind::LMStudio, source)?,
            request_timeout,
        };
        debug!(?settings, "Resolved settings");

        Ok(settings)
    }

    /// Configuration section for a provider
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAI => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::LMStudio => &self.lmstudio,
        }
    }

    /// Configuration section of the selected provider
    pub fn selected(&self) -> &ProviderConfig {
        self.provider(self.selected_provider)
    }
}

static SETTINGS: OnceLock<AppSettings> = OnceLock::new();

/// Load settings once per process.
///
/// The first successful call resolves and caches the settings; every later
/// call returns the same instance. A failed resolution is not cached.
pub fn load_settings() -> Result<&'static AppSettings> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }

    let resolved = AppSettings::from_env()?;
    Ok(init_once(&SETTINGS, resolved, log_loaded))
}

/// Store `resolved` unless another caller got there first.
///
/// Racing initializers both resolve; only the winner runs `on_init`.
fn init_once<'a>(
    cell: &'a OnceLock<AppSettings>,
    resolved: AppSettings,
    on_init: impl FnOnce(&AppSettings),
) -> &'a AppSettings {
    cell.get_or_init(|| {
        on_init(&resolved);
        resolved
    })
}

fn log_loaded(settings: &AppSettings) {
    info!(
        provider = %settings.selected_provider,
        openai_key = settings.openai.has_api_key(),
        anthropic_key = settings.anthropic.has_api_key(),
        lmstudio_endpoint = settings.lmstudio.endpoint.as_deref().unwrap_or_default(),
        "Settings loaded"
    );
}

fn parse_temperature(field: &str, raw: &str) -> Result<f32> {
    let value: f32 = raw
        .parse()
        .map_err(|_| LlmHubError::config(field, format!("'{}' is not a valid number", raw)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(LlmHubError::config(
            field,
            format!("temperature must be a non-negative number, got {}", raw),
        ));
    }
    Ok(value)
}

fn parse_positive<T>(field: &str, raw: &str) -> Result<T>
where
    T: FromStr + PartialEq + Default,
{
    let value: T = raw
        .parse()
        .map_err(|_| LlmHubError::config(field, format!("'{}' is not a valid positive integer", raw)))?;
    if value == T::default() {
        return Err(LlmHubError::config(field, "must be greater than zero"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_with_empty_source() {
        let settings = AppSettings::from_source(&SettingsSource::new()).unwrap();

        assert_eq!(settings.selected_provider, ProviderKind::OpenAI);
        assert_eq!(settings.openai.api_key, None);
        assert_eq!(settings.openai.model.as_deref(), Some(DEFAULT_OPENAI_MODEL));
        assert_eq!(settings.anthropic.api_key, None);
        assert_eq!(settings.anthropic.model.as_deref(), Some(DEFAULT_ANTHROPIC_MODEL));
        assert_eq!(settings.lmstudio.api_key.as_deref(), Some(DEFAULT_LMSTUDIO_API_KEY));
        assert_eq!(settings.lmstudio.endpoint.as_deref(), Some(DEFAULT_LMSTUDIO_ENDPOINT));
        assert_eq!(settings.lmstudio.model, None);
        assert_eq!(settings.openai.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(settings.openai.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(settings.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_api_key_from_env() {
        let source = SettingsSource::new().with_env("OPENAI_API_KEY", "secret123");
        let settings = AppSettings::from_source(&source).unwrap();
        assert_eq!(settings.openai.api_key.as_deref(), Some("secret123"));
        assert!(settings.openai.has_api_key());
        assert!(!settings.anthropic.has_api_key());
    }

    #[test]
    fn test_selected_provider_parsing() {
        for (raw, expected) in [
            ("openai", ProviderKind::OpenAI),
            ("Anthropic", ProviderKind::Anthropic),
            ("lmstudio", ProviderKind::LMStudio),
            ("local", ProviderKind::LMStudio),
        ] {
            let source = SettingsSource::new().with_env(SELECTED_PROVIDER_VAR, raw);
            let settings = AppSettings::from_source(&source).unwrap();
            assert_eq!(settings.selected_provider, expected);
        }
    }

    #[test]
    fn test_unknown_provider_fails_at_load() {
        let source = SettingsSource::new().with_env(SELECTED_PROVIDER_VAR, "grok");
        match AppSettings::from_source(&source) {
            Err(LlmHubError::Configuration { field, message }) => {
                assert_eq!(field, SELECTED_PROVIDER_VAR);
                assert!(message.contains("grok"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_kind_from_str_rejects_unknown() {
        let err = "grok".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, LlmHubError::UnsupportedProvider(name) if name == "grok"));
    }

    #[test]
    fn test_per_provider_numbers_override_shared() {
        let source = SettingsSource::new()
            .with_env("TEMPERATURE", "0.3")
            .with_env("ANTHROPIC_TEMPERATURE", "0.9")
            .with_file_entry("MAX_TOKENS", "512");
        let settings = AppSettings::from_source(&source).unwrap();

        assert_eq!(settings.openai.temperature, 0.3);
        assert_eq!(settings.anthropic.temperature, 0.9);
        assert_eq!(settings.lmstudio.max_tokens, 512);
    }

    #[test]
    fn test_bad_temperature_names_field() {
        let source = SettingsSource::new().with_env("OPENAI_TEMPERATURE", "warm");
        match AppSettings::from_source(&source) {
            Err(LlmHubError::Configuration { field, .. }) => assert_eq!(field, "OPENAI_TEMPERATURE"),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_max_tokens_names_field() {
        let source = SettingsSource::new().with_env("LMSTUDIO_MAX_TOKENS", "-5");
        match AppSettings::from_source(&source) {
            Err(LlmHubError::Configuration { field, .. }) => assert_eq!(field, "LMSTUDIO_MAX_TOKENS"),
            other => panic!("expected configuration error, got {:?}", other),
        }

        let source = SettingsSource::new().with_env("MAX_TOKENS", "0");
        assert!(AppSettings::from_source(&source).is_err());
    }

    #[test]
    fn test_bad_timeout_names_field() {
        let source = SettingsSource::new().with_env(REQUEST_TIMEOUT_VAR, "soon");
        match AppSettings::from_source(&source) {
            Err(LlmHubError::Configuration { field, .. }) => assert_eq!(field, REQUEST_TIMEOUT_VAR),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_lmstudio_endpoint_trailing_slash_trimmed() {
        let source = SettingsSource::new().with_env("LMSTUDIO_API_ENDPOINT", "http://10.0.0.5:1234/v1/");
        let settings = AppSettings::from_source(&source).unwrap();
        assert_eq!(settings.lmstudio.endpoint.as_deref(), Some("http://10.0.0.5:1234/v1"));
    }

    #[test]
    fn test_hosted_providers_ignore_endpoint_vars() {
        let source = SettingsSource::new().with_env("OPENAI_API_ENDPOINT", "http://evil.example");
        let settings = AppSettings::from_source(&source).unwrap();
        assert_eq!(settings.openai.endpoint, None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let source = SettingsSource::new().with_env("ANTHROPIC_API_KEY", "sk-ant-very-secret");
        let settings = AppSettings::from_source(&source).unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("sk-ant-very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_selected_section() {
        let source = SettingsSource::new()
            .with_env(SELECTED_PROVIDER_VAR, "lmstudio")
            .with_env("DEFAULT_LMSTUDIO_MODEL", "qwen2.5-7b-instruct");
        let settings = AppSettings::from_source(&source).unwrap();
        assert_eq!(settings.selected().model.as_deref(), Some("qwen2.5-7b-instruct"));
    }

    #[test]
    fn test_load_settings_is_cached() {
        let first = load_settings().unwrap();
        let second = load_settings().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_init_once_runs_hook_for_winner_only() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let cell = Arc::new(OnceLock::new());
        let inits = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let inits = Arc::clone(&inits);
                std::thread::spawn(move || {
                    let resolved = AppSettings::from_source(&SettingsSource::new()).unwrap();
                    let settings = init_once(&cell, resolved, |_| {
                        inits.fetch_add(1, Ordering::SeqCst);
                    });
                    settings as *const AppSettings as usize
                })
            })
            .collect();

        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(addresses.iter().all(|a| *a == addresses[0]));
    }
}
