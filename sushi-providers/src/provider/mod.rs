//! Multi-provider abstraction for LLM APIs.
//!
//! Provides a unified interface for calling the Anthropic, OpenAI-compatible
//! (OpenAI, Groq, Fireworks) and Gemini APIs, one-shot or streamed.

mod anthropic;
mod compatible;
mod gemini;
mod sse;

pub use anthropic::AnthropicProvider;
pub use compatible::{AuthStyle, CompatibleProvider};
pub use gemini::GeminiProvider;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use sushi_common::config::LlmSecretsConfig;

// ============================================================================
// Provider Trait
// ============================================================================

/// Incremental text fragments of a streamed completion.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// Unified interface for LLM providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get available models for this provider.
    fn models(&self) -> Vec<&str>;

    /// Check if this provider supports a given model.
    fn supports_model(&self, model: &str) -> bool;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a chat completion request and stream the reply text.
    ///
    /// Errors before the first byte are returned directly; errors while
    /// reading surface as the stream's final item.
    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}:{model}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub(crate) fn new(provider: &str, model: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    /// Temperature (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// System prompt (if not in messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

/// Read a non-success response body into a `ProviderError`.
pub(crate) async fn error_from_response(
    provider: &str,
    model: &str,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::new(provider, model, format!("API error ({status}): {body}")).with_status(status)
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Registry of available providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    model_to_provider: HashMap<String, String>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            model_to_provider: HashMap::new(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();

        for model in provider.models() {
            self.model_to_provider.insert(model.to_string(), name.clone());
        }

        self.providers.insert(name, provider);
    }

    /// Get the provider for a model.
    pub fn get_for_model(&self, model: &str) -> Option<Arc<dyn Provider>> {
        if let Some(provider_name) = self.model_to_provider.get(model) {
            return self.providers.get(provider_name).cloned();
        }

        self.providers
            .values()
            .find(|provider| provider.supports_model(model))
            .cloned()
    }

    /// List all registered providers.
    pub fn list_providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn configured(key: Option<&String>) -> Option<&str> {
    key.map(String::as_str).filter(|k| !k.is_empty())
}

/// Create a registry with every provider that has an API key configured.
pub fn create_registry(secrets: &LlmSecretsConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = configured(secrets.anthropic.as_ref()) {
        registry.register(Arc::new(AnthropicProvider::new(key)));
    }
    if let Some(key) = configured(secrets.openai.as_ref()) {
        registry.register(Arc::new(CompatibleProvider::openai(key)));
    }
    if let Some(key) = configured(secrets.google.as_ref()) {
        registry.register(Arc::new(GeminiProvider::new(key)));
    }
    if let Some(key) = configured(secrets.groq.as_ref()) {
        registry.register(Arc::new(CompatibleProvider::groq(key)));
    }
    if let Some(key) = configured(secrets.fireworks.as_ref()) {
        registry.register(Arc::new(CompatibleProvider::fireworks(key)));
    }

    registry
}
