//! llm-hub Library
//!
//! One async interface over OpenAI, Anthropic and LM Studio, selected and
//! configured from the environment.
//! The interactive binary is in src/main.rs.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;

pub use config::{load_settings, AppSettings, ProviderConfig, ProviderKind};
pub use error::{LlmHubError, Result};
pub use llm::{create_client, GenerationOptions, LLMClient};
