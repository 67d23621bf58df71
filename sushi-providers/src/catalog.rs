//! Model catalog.
//!
//! Every model a session can select with a command lives here, together with
//! the command token that selects it, the name shown to users and the backend
//! that serves it.

use serde::{Deserialize, Serialize};

/// Model id used when nothing else has been selected.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Backend family serving a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    OpenAI,
    Anthropic,
    Gemini,
    Fireworks,
    Groq,
}

impl Backend {
    /// Provider name as registered in the `ProviderRegistry`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Fireworks => "fireworks",
            Self::Groq => "groq",
        }
    }
}

/// Models selectable from a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownModel {
    Gpt4o,
    Gpt4oMini,
    Gpt4Turbo,
    O1Preview,
    O1Mini,
    ClaudeOpus,
    ClaudeSonnet,
    ClaudeHaiku,
    GeminiPro,
    GeminiFlash,
    Llama70b,
    Llama405b,
    Llama8b,
    Groq70b,
}

impl KnownModel {
    pub const ALL: [KnownModel; 14] = [
        Self::Gpt4o,
        Self::Gpt4oMini,
        Self::Gpt4Turbo,
        Self::O1Preview,
        Self::O1Mini,
        Self::ClaudeOpus,
        Self::ClaudeSonnet,
        Self::ClaudeHaiku,
        Self::GeminiPro,
        Self::GeminiFlash,
        Self::Llama70b,
        Self::Llama405b,
        Self::Llama8b,
        Self::Groq70b,
    ];

    /// API model id.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::O1Preview => "o1-preview",
            Self::O1Mini => "o1-mini",
            Self::ClaudeOpus => "claude-3-opus-20240229",
            Self::ClaudeSonnet => DEFAULT_MODEL,
            Self::ClaudeHaiku => "claude-3-haiku-20240307",
            Self::GeminiPro => "gemini-1.5-pro-latest",
            Self::GeminiFlash => "gemini-1.5-flash-latest",
            Self::Llama70b => "accounts/fireworks/models/llama-v3-70b-instruct",
            Self::Llama405b => "accounts/fireworks/models/llama-v3p1-405b-instruct",
            Self::Llama8b => "accounts/fireworks/models/llama-v3p1-8b-instruct",
            Self::Groq70b => "llama3-70b-8192",
        }
    }

    /// Human-readable name used in acknowledgements.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gpt4o => "GPT-4o",
            Self::Gpt4oMini => "GPT-4o mini",
            Self::Gpt4Turbo => "GPT-4 Turbo",
            Self::O1Preview => "o1-preview",
            Self::O1Mini => "o1-mini",
            Self::ClaudeOpus => "Claude 3 Opus",
            Self::ClaudeSonnet => "Claude 3.5 Sonnet",
            Self::ClaudeHaiku => "Claude 3 Haiku",
            Self::GeminiPro => "Gemini 1.5 Pro",
            Self::GeminiFlash => "Gemini 1.5 Flash",
            Self::Llama70b => "Llama 3 70B",
            Self::Llama405b => "Llama 3.1 405B",
            Self::Llama8b => "Llama 3.1 8B",
            Self::Groq70b => "Llama 3 70B (Groq)",
        }
    }

    /// Command token (without prefix) that selects this model.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt4o",
            Self::Gpt4oMini => "mini",
            Self::Gpt4Turbo => "gpt4",
            Self::O1Preview => "o1",
            Self::O1Mini => "o1mini",
            Self::ClaudeOpus => "opus",
            Self::ClaudeSonnet => "sonnet",
            Self::ClaudeHaiku => "haiku",
            Self::GeminiPro => "gemini",
            Self::GeminiFlash => "flash",
            Self::Llama70b => "llama70b",
            Self::Llama405b => "llama405b",
            Self::Llama8b => "llama8b",
            Self::Groq70b => "groq70b",
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Gpt4o | Self::Gpt4oMini | Self::Gpt4Turbo | Self::O1Preview | Self::O1Mini => {
                Backend::OpenAI
            }
            Self::ClaudeOpus | Self::ClaudeSonnet | Self::ClaudeHaiku => Backend::Anthropic,
            Self::GeminiPro | Self::GeminiFlash => Backend::Gemini,
            Self::Llama70b | Self::Llama405b | Self::Llama8b => Backend::Fireworks,
            Self::Groq70b => Backend::Groq,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.token() == token)
    }

    /// Model ids served by one backend.
    pub fn ids_for(backend: Backend) -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|m| m.backend() == backend)
            .map(|m| m.id())
            .collect()
    }
}

/// Display name for a model id, falling back to the id itself.
pub fn display_name_for(id: &str) -> &str {
    KnownModel::from_id(id).map_or(id, |m| m.display_name())
}
