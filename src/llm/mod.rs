//! LLM integration module
//!
//! This module provides the trait-based LLM client abstraction,
//! implementations for each supported provider, and the factory that
//! picks one from the settings.

pub mod client;
pub mod factory;
pub mod provider;
pub mod stream;

// Provider implementations
pub mod providers {
    pub mod anthropic;
    pub mod lmstudio;
    pub mod openai;
}

// Re-exports
pub use factory::{create_client, create_client_by_name, create_client_for};
pub use provider::{
    collect_stream, stream_from_generate, ClientParams, GenerationOptions, LLMClient, SamplingDefaults, TextStream,
};
