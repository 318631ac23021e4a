//! Command handlers for CLI
//!
//! This module implements all `/` commands for the llm-hub REPL and the
//! prompt path that sends plain input to the active client.

use crate::error::{LlmHubError, Result};
use crate::llm::{GenerationOptions, LLMClient};
use futures::StreamExt;
use std::io::Write;

/// Command types
#[derive(Debug, Clone, PartialEq)]
pub enum CommandType {
    /// Show help message
    Help,
    /// Show the active provider
    Provider,
    /// Toggle streaming output
    Stream { enabled: bool },
    /// Override temperature for this session
    Temperature { value: f32 },
    /// Override max tokens for this session
    MaxTokens { value: u32 },
    /// Exit the application
    Quit,
    /// Prompt for the model
    Prompt { text: String },
}

/// Parsed command
#[derive(Debug, Clone)]
pub struct Command {
    /// The type of command
    pub command_type: CommandType,
}

impl Command {
    /// Parse a command from user input
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if !input.starts_with('/') {
            return Ok(Command {
                command_type: CommandType::Prompt {
                    text: input.to_string(),
                },
            });
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts[0];

        let command_type = match cmd {
            "/help" => CommandType::Help,
            "/provider" => CommandType::Provider,
            "/stream" => match parts.get(1).copied() {
                Some("on") => CommandType::Stream { enabled: true },
                Some("off") => CommandType::Stream { enabled: false },
                _ => return Err(syntax(cmd, "/stream on|off")),
            },
            "/temperature" => {
                let value = parts
                    .get(1)
                    .and_then(|v| v.parse::<f32>().ok())
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| syntax(cmd, "/temperature <number >= 0>"))?;
                CommandType::Temperature { value }
            }
            "/max-tokens" => {
                let value = parts
                    .get(1)
                    .and_then(|v| v.parse::<u32>().ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(|| syntax(cmd, "/max-tokens <positive integer>"))?;
                CommandType::MaxTokens { value }
            }
            "/quit" | "/exit" => CommandType::Quit,
            _ => return Err(LlmHubError::UnknownCommand(cmd.to_string())),
        };

        Ok(Command { command_type })
    }
}

fn syntax(command: &str, expected: &str) -> LlmHubError {
    LlmHubError::InvalidCommandSyntax {
        command: command.to_string(),
        expected: expected.to_string(),
    }
}

/// Per-session REPL state. Overrides travel with each call as options.
#[derive(Debug, Clone)]
pub struct Session {
    /// Print chunks as they arrive
    pub streaming: bool,
    /// Overrides sent with every prompt
    pub options: GenerationOptions,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            streaming: true,
            options: GenerationOptions::default(),
        }
    }
}

/// Handle a non-prompt command and return the message to print
pub fn handle_command(command: &Command, session: &mut Session, client: &dyn LLMClient) -> String {
    match &command.command_type {
        CommandType::Help => HELP.to_string(),
        CommandType::Provider => describe_client(client, session),
        CommandType::Stream { enabled } => {
            session.streaming = *enabled;
            format!("✓ Streaming {}", if *enabled { "on" } else { "off" })
        }
        CommandType::Temperature { value } => {
            session.options.temperature = Some(*value);
            format!("✓ Temperature set to {} for this session", value)
        }
        CommandType::MaxTokens { value } => {
            session.options.max_tokens = Some(*value);
            format!("✓ Max tokens set to {} for this session", value)
        }
        CommandType::Quit => "Goodbye!".to_string(),
        CommandType::Prompt { .. } => String::new(),
    }
}

/// Send a prompt and write the answer to `out`
pub async fn run_prompt<W: Write>(
    client: &dyn LLMClient,
    text: &str,
    session: &Session,
    out: &mut W,
) -> Result<()> {
    if session.streaming {
        let mut stream = client.stream_generate(text, Some(&session.options)).await?;
        while let Some(chunk) = stream.next().await {
            write!(out, "{}", chunk?)?;
            out.flush()?;
        }
        writeln!(out)?;
    } else {
        let answer = client.generate(text, Some(&session.options)).await?;
        writeln!(out, "{}", answer)?;
    }
    Ok(())
}

/// Describe the active client
pub fn describe_client(client: &dyn LLMClient, session: &Session) -> String {
    let mut lines = vec![
        format!("Provider:  {}", client.provider_name()),
        format!("Model:     {}", client.model_name()),
        format!("Endpoint:  {}", client.endpoint()),
        format!("API key:   {}", mask_key(client.api_key())),
        format!("Streaming: {}", if session.streaming { "on" } else { "off" }),
    ];
    if let Some(t) = session.options.temperature {
        lines.push(format!("Temperature override: {}", t));
    }
    if let Some(m) = session.options.max_tokens {
        lines.push(format!("Max tokens override:  {}", m));
    }
    lines.join("\n")
}

fn mask_key(key: Option<&str>) -> String {
    match key {
        None | Some("") => "not set".to_string(),
        Some(key) if key.chars().count() > 8 => {
            let chars: Vec<char> = key.chars().collect();
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        }
        Some(_) => "***".to_string(),
    }
}

/// Format an error for display
pub fn format_error(error: &LlmHubError) -> String {
    format!("Error: {}", error)
}

const HELP: &str = r#"
llm-hub Commands

Session:
  /provider          Show the active provider, model and endpoint
  /stream on|off     Print answers as they arrive, or all at once
  /temperature <n>   Override temperature for this session
  /max-tokens <n>    Override max tokens for this session
  /help              Show this help message
  /quit, /exit       Exit llm-hub

Prompts:
  Any text without a / prefix is sent to the active provider.

Provider selection comes from SELECTED_LLM_PROVIDER (openai, anthropic,
lmstudio) in the environment or .env file.
"#;
