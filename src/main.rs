// llm-hub: talk to OpenAI, Anthropic or a local LM Studio server
//
// This is the main entry point for the llm-hub REPL.

use anyhow::{Context, Result};
use llm_hub::cli::Repl;
use llm_hub::{create_client, load_settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so model output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,llm_hub=info")))
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings().context("Failed to load settings")?;
    let client = create_client(settings).context("Failed to create LLM client")?;

    let mut repl = Repl::new(client)?;
    repl.run().await?;

    Ok(())
}
