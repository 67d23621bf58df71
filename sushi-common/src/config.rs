//! Configuration management for the relay.
//!
//! The relay reads a single JSON file at `~/.sushibot/config.json`
//! (or the path in `SUSHIBOT_CONFIG`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SLACK_BOT_TOKEN` → secrets.slack.bot_token
//! - `SLACK_SIGNING_SECRET` → secrets.slack.signing_secret
//! - `ANTHROPIC_API_KEY` → secrets.llm.anthropic
//! - `OPENAI_API_KEY` → secrets.llm.openai
//! - `GOOGLE_API_KEY` / `GEMINI_API_KEY` → secrets.llm.google
//! - `GROQ_API_KEY` → secrets.llm.groq
//! - `FIREWORKS_API_KEY` → secrets.llm.fireworks
//! - `SUSHIBOT_BIND_ADDRESS` → network.bind
//! - `PORT` → network.port
//! - `SUSHIBOT_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SUSHIBOT_CONFIG";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sushibot"),
        |dirs| dirs.home_dir().join(".sushibot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration for the Slack Events endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1"
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port. Default: 3000
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

// ============================================================================
// Secrets Configuration
// ============================================================================

/// Grouped secrets configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// LLM provider API keys
    #[serde(default)]
    pub llm: LlmSecretsConfig,

    /// Slack app credentials
    #[serde(default)]
    pub slack: SlackSecretsConfig,
}

/// LLM provider API keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmSecretsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fireworks: Option<String>,
}

/// Slack app credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlackSecretsConfig {
    /// Bot user OAuth token (`xoxb-...`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// Signing secret used to verify Events API requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Model selection and prompt settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model id used until a session selects another one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// System instruction prepended to every model call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum tokens to generate per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,

    /// Sampling temperature (provider default when absent)
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

fn default_model() -> String {
    "claude-3-5-sonnet-20240620".into()
}

fn default_system_prompt() -> String {
    concat!(
        "You are a helpful assistant called SushiBot running as a Slack App. Keep the ",
        "conversation natural and flowing, don't respond with robotic or closing statements like ",
        "'Is there anything else?'. You are a friend, not a bot. ",
        "Whatever you say will be sent back as a text to the user. Feel free to use rich text ",
        "formatting appropriate for the Slack API. ",
        "Here goes the chat history so far and the latest activity..."
    )
    .into()
}

fn default_max_tokens() -> i64 {
    4096
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Command syntax and history window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Reserved prefix character that marks a command
    #[serde(default = "default_command_prefix")]
    pub command_prefix: char,

    /// Reject command candidates containing whitespace
    #[serde(default = "default_true")]
    pub strict_commands: bool,

    /// Number of platform messages to fetch per turn (`null` = no cap)
    #[serde(default = "default_history_limit")]
    pub history_limit: Option<usize>,

    /// Streaming mode for newly created sessions
    #[serde(default = "default_true")]
    pub streaming_default: bool,

    /// Extra command tokens mapped onto built-in ones (e.g. `"claude": "sonnet"`)
    #[serde(default)]
    pub command_aliases: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            strict_commands: true,
            history_limit: default_history_limit(),
            streaming_default: true,
            command_aliases: HashMap::new(),
        }
    }
}

fn default_command_prefix() -> char {
    '\\'
}

fn default_history_limit() -> Option<usize> {
    Some(50)
}

// ============================================================================
// Fetchers Configuration
// ============================================================================

/// Resource fetcher cache sizes and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchersConfig {
    #[serde(default = "default_small_cache")]
    pub pdf_cache_capacity: usize,
    #[serde(default = "default_small_cache")]
    pub text_cache_capacity: usize,
    #[serde(default = "default_large_cache")]
    pub web_cache_capacity: usize,
    #[serde(default = "default_large_cache")]
    pub youtube_cache_capacity: usize,
    /// Scraped pages longer than this many characters are truncated
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
    /// Per-request timeout for resource downloads
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchersConfig {
    fn default() -> Self {
        Self {
            pdf_cache_capacity: default_small_cache(),
            text_cache_capacity: default_small_cache(),
            web_cache_capacity: default_large_cache(),
            youtube_cache_capacity: default_large_cache(),
            max_page_chars: default_max_page_chars(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_small_cache() -> usize {
    10
}

fn default_large_cache() -> usize {
    100
}

fn default_max_page_chars() -> usize {
    // roughly 100k tokens
    1000 * 4 * 100
}

fn default_fetch_timeout() -> u64 {
    30
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets clamped to `warn`
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub fetchers: FetchersConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("SLACK_BOT_TOKEN") {
            self.secrets.slack.bot_token = Some(token);
        }
        if let Ok(secret) = std::env::var("SLACK_SIGNING_SECRET") {
            self.secrets.slack.signing_secret = Some(secret);
        }

        if let Ok(bind) = std::env::var("SUSHIBOT_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Ok(level) = std::env::var("SUSHIBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        self.apply_llm_env_fallbacks();
    }

    /// Apply LLM API key environment variable fallbacks.
    fn apply_llm_env_fallbacks(&mut self) {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.secrets.llm.anthropic = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.secrets.llm.openai = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY")) {
            self.secrets.llm.google = Some(key);
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.secrets.llm.groq = Some(key);
        }
        if let Ok(key) = std::env::var("FIREWORKS_API_KEY") {
            self.secrets.llm.fireworks = Some(key);
        }
    }

    /// Check that the settings required to serve Slack traffic are present.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self
            .secrets
            .slack
            .bot_token
            .as_deref()
            .is_none_or(str::is_empty)
        {
            problems.push("secrets.slack.bot_token is not set (SLACK_BOT_TOKEN)");
        }
        if self.session.command_prefix.is_whitespace() {
            problems.push("session.command_prefix must not be whitespace");
        }
        if self.session.history_limit == Some(0) {
            problems.push("session.history_limit must be greater than zero");
        }
        if self
            .session
            .command_aliases
            .keys()
            .any(|alias| alias.is_empty() || alias.contains(char::is_whitespace))
        {
            problems.push("session.command_aliases keys must be single non-empty words");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration: {}", problems.join("; "))
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    /// Slack bot token, empty when not configured.
    pub fn slack_bot_token(&self) -> String {
        self.secrets.slack.bot_token.clone().unwrap_or_default()
    }
}
