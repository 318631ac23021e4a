//! Error types for llm-hub
//!
//! This module defines the error types used throughout the library and CLI.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for llm-hub
pub type Result<T> = std::result::Result<T, LlmHubError>;

/// Main error type for llm-hub
#[derive(Error, Debug)]
pub enum LlmHubError {
    /// Bad or unparsable settings; fatal at startup
    #[error("Configuration error in {field}: {message}")]
    Configuration { field: String, message: String },

    /// Discriminator that names no known provider
    #[error("Unsupported LLM provider: '{0}' (expected one of: openai, anthropic, lmstudio)")]
    UnsupportedProvider(String),

    /// Backend call failed (auth, rate limit, network, malformed response)
    #[error("{provider} generation failed for model '{model}': {message}")]
    Generation {
        provider: String,
        model: String,
        message: String,
        status: Option<u16>,
    },

    /// Per-call deadline exceeded
    #[error("{provider} request for model '{model}' timed out after {after:?}")]
    Timeout {
        provider: String,
        model: String,
        after: Duration,
    },

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown REPL command
    #[error("Unknown command: {0} (type /help for a list)")]
    UnknownCommand(String),

    /// REPL command with missing or malformed arguments
    #[error("Invalid syntax for {command}. Usage: {expected}")]
    InvalidCommandSyntax { command: String, expected: String },
}

impl LlmHubError {
    /// Build a configuration error for the given field
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status attached to a generation failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Generation { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry or fall back to another provider
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Generation { .. } | Self::Timeout { .. })
    }
}

/// Provider and model a backend call was made for.
///
/// Every failure leaving a provider carries this so callers can log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub provider: String,
    pub model: String,
}

impl CallContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn generation(&self, message: impl Into<String>, status: Option<u16>) -> LlmHubError {
        LlmHubError::Generation {
            provider: self.provider.clone(),
            model: self.model.clone(),
            message: message.into(),
            status,
        }
    }

    pub fn timeout(&self, after: Duration) -> LlmHubError {
        LlmHubError::Timeout {
            provider: self.provider.clone(),
            model: self.model.clone(),
            after,
        }
    }
}
