//! Session commands.
//!
//! A command is a message whose trimmed body starts with the reserved prefix
//! character (`\` by default) and, in strict mode, holds no whitespace.
//! Tokens resolve through a synonym table at parse time.

use std::collections::HashMap;
use sushi_common::config::SessionConfig;
use sushi_providers::KnownModel;

/// Closed set of session commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// History boundary; no state change.
    Reset,
    /// Report the current model.
    Who,
    /// Switch the session to another model.
    SelectModel(KnownModel),
    /// Flip streaming on or off.
    ToggleStream,
    /// Force streaming off.
    DisableStream,
    /// Show the command reference.
    Help,
}

/// Built-in token table.
fn builtin(token: &str) -> Option<Command> {
    match token {
        "reset" | "clear" => Some(Command::Reset),
        "who" | "model" => Some(Command::Who),
        "stream" => Some(Command::ToggleStream),
        "nostream" => Some(Command::DisableStream),
        "help" | "?" => Some(Command::Help),
        other => KnownModel::from_token(other).map(Command::SelectModel),
    }
}

/// Command recognition rules.
#[derive(Debug, Clone)]
pub struct CommandSyntax {
    prefix: char,
    strict: bool,
    aliases: HashMap<String, String>,
}

impl Default for CommandSyntax {
    fn default() -> Self {
        Self::new('\\', true)
    }
}

impl CommandSyntax {
    pub fn new(prefix: char, strict: bool) -> Self {
        Self {
            prefix,
            strict,
            aliases: HashMap::new(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            prefix: config.command_prefix,
            strict: config.strict_commands,
            aliases: config.command_aliases.clone(),
        }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Whether the trimmed body is command syntax, recognized or not.
    pub fn is_command(&self, text: &str) -> bool {
        let text = text.trim();
        match text.strip_prefix(self.prefix) {
            Some(rest) => !rest.is_empty() && !(self.strict && rest.contains(char::is_whitespace)),
            None => false,
        }
    }

    /// Resolve command syntax to a known command.
    pub fn parse(&self, text: &str) -> Option<Command> {
        if !self.is_command(text) {
            return None;
        }
        let token = text.trim().strip_prefix(self.prefix)?.trim();
        let token = self.aliases.get(token).map_or(token, String::as_str);
        builtin(token)
    }

    /// Render a token with the prefix, e.g. `\sonnet`.
    pub fn render(&self, token: &str) -> String {
        format!("{}{token}", self.prefix)
    }
}
