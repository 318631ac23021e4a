//! Settings Sources
//!
//! This module layers the places a setting can come from: the process
//! environment first, then an optional `KEY=value` env file. Nothing is
//! written back; the env file is read without touching the process env.

use crate::error::{LlmHubError, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Default env file name, looked up in the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Variable that points at a different env file
pub const ENV_FILE_VAR: &str = "LLM_HUB_ENV_FILE";

/// Key/value view over the environment and an optional env file
#[derive(Debug, Clone, Default)]
pub struct SettingsSource {
    /// Explicit environment variables (highest precedence)
    env: HashMap<String, String>,
    /// Entries read from the env file
    file: HashMap<String, String>,
}

impl SettingsSource {
    /// Create an empty source; every lookup falls through to defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the process environment and the env file it points at
    pub fn from_process() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        let path = env
            .get(ENV_FILE_VAR)
            .filter(|p| !p.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENV_FILE.to_string());

        Self { env, file: HashMap::new() }.with_env_file(path)
    }

    /// Set an environment entry
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set an env-file entry
    pub fn with_file_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.file.insert(key.into(), value.into());
        self
    }

    /// Read an env file. A missing file is not an error.
    ///
    /// `$` is literal in values; only `${NAME}` references are expanded.
    pub fn with_env_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No env file found");
                return Ok(self);
            }
            Err(e) => return Err(env_file_error(path, e)),
        };

        let escaped = literal_dollars(&contents);
        let mut count = 0usize;
        for item in dotenvy::from_read_iter(escaped.as_bytes()) {
            let (key, value) = item.map_err(|e| env_file_error(path, e))?;
            self.file.insert(key, value);
            count += 1;
        }
        debug!(path = %path.display(), entries = count, "Loaded env file");

        Ok(self)
    }

    /// Look up a key. Environment wins over the file; blank values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.file
                    .get(key)
                    .map(String::as_str)
                    .filter(|v| !v.trim().is_empty())
            })
            .map(str::trim)
    }

    /// First key that is set, in order
    pub fn first_of(&self, keys: &[&str]) -> Option<(String, &str)> {
        keys.iter()
            .find_map(|key| self.get(key).map(|value| (key.to_string(), value)))
    }
}

/// Escape every `$` that does not open a `${NAME}` reference, outside single quotes
fn literal_dollars(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if escaped {
                escaped = false;
            } else if quote == Some('\'') {
                if c == '\'' {
                    quote = None;
                }
            } else {
                match c {
                    '\\' => escaped = true,
                    '\'' | '"' if quote.is_none() => quote = Some(c),
                    '"' => quote = None,
                    '$' if chars.peek() != Some(&'{') => out.push('\\'),
                    _ => {}
                }
            }
            out.push(c);
        }
        out.push('\n');
    }
    out
}

fn env_file_error(path: &Path, err: impl std::fmt::Display) -> LlmHubError {
    LlmHubError::config(path.display().to_string(), format!("failed to read env file: {}", err))
}
