//! REPL implementation
//!
//! This module implements the interactive Read-Eval-Print Loop for llm-hub.

use crate::cli::commands::{self, format_error, Command, CommandType, Session};
use crate::error::{LlmHubError, Result};
use crate::llm::LLMClient;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::Context;
use rustyline::Helper;
use rustyline::{CompletionType, Config, Editor};
use std::path::PathBuf;
use tracing::debug;

const COMMANDS: [&str; 7] = [
    "/provider",
    "/stream",
    "/temperature",
    "/max-tokens",
    "/help",
    "/quit",
    "/exit",
];

/// `/` command completer
struct CommandCompleter;

impl Completer for CommandCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> std::result::Result<(usize, Vec<String>), ReadlineError> {
        if line.starts_with('/') {
            let matches: Vec<String> = COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|s| s.to_string())
                .collect();
            Ok((0, matches))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}

/// llm-hub REPL
pub struct Repl {
    /// The rustyline editor
    editor: Editor<CommandCompleter, DefaultHistory>,
    /// Whether the REPL should continue running
    running: bool,
    /// Client prompts are sent to
    client: Box<dyn LLMClient>,
    /// Session overrides
    session: Session,
    /// Where history is persisted
    history_path: PathBuf,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(client: Box<dyn LLMClient>) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .build();

        let mut editor = Editor::<CommandCompleter, DefaultHistory>::with_config(config).map_err(|e| {
            LlmHubError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to initialize editor: {}", e),
            ))
        })?;
        editor.set_helper(Some(CommandCompleter));

        let history_path = dirs::home_dir()
            .map(|p| p.join(".llm-hub").join("history"))
            .unwrap_or_else(|| ".llm-hub-history".into());

        if let Err(e) = editor.load_history(&history_path) {
            debug!(path = %history_path.display(), error = %e, "No history loaded");
        }

        Ok(Self {
            editor,
            running: true,
            client,
            session: Session::default(),
            history_path,
        })
    }

    /// Run the REPL loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        while self.running {
            match self.editor.readline("> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match Command::parse(line) {
                        Ok(command) => self.handle_command(command).await,
                        Err(e) => println!("{}", format_error(&e)),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    self.running = false;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    self.running = false;
                }
            }
        }

        self.save_history();
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("llm-hub v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "Using {} ({}) at {}",
            self.client.provider_name(),
            self.client.model_name(),
            self.client.endpoint()
        );
        println!();
        println!("Type a prompt, or /help for commands.");
        println!();
    }

    /// Handle a command
    async fn handle_command(&mut self, command: Command) {
        match &command.command_type {
            CommandType::Prompt { text } => {
                let mut stdout = std::io::stdout();
                if let Err(e) = commands::run_prompt(self.client.as_ref(), text, &self.session, &mut stdout).await {
                    println!();
                    println!("{}", format_error(&e));
                }
            }
            CommandType::Quit => {
                println!("{}", commands::handle_command(&command, &mut self.session, self.client.as_ref()));
                self.running = false;
            }
            _ => {
                println!("{}", commands::handle_command(&command, &mut self.session, self.client.as_ref()));
            }
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(&self.history_path) {
            debug!(path = %self.history_path.display(), error = %e, "Failed to save history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completer_lists_matching_commands() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let (start, matches) = CommandCompleter.complete("/st", 3, &ctx).unwrap();
        assert_eq!(start, 0);
        assert_eq!(matches, vec!["/stream".to_string()]);

        let (_, matches) = CommandCompleter.complete("hello", 5, &ctx).unwrap();
        assert!(matches.is_empty());
    }
}
