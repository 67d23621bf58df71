//! Anthropic (Claude) provider implementation.

use super::sse::{self, SseAction};
use super::{
    error_from_response, ChatRequest, ChatResponse, Provider, ProviderError, TextStream,
    TokenUsage,
};
use crate::catalog::{Backend, KnownModel};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const NAME: &str = "anthropic";

/// Anthropic API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com")
    }

    /// Create with custom base URL.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_request(request: &ChatRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: request.system.clone(),
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&Self::build_request(request, stream))
            .send()
            .await
            .map_err(|e| ProviderError::new(NAME, &request.model, format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(NAME, &request.model, response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn models(&self) -> Vec<&str> {
        KnownModel::ids_for(Backend::Anthropic)
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("claude")
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let response = self.send(&request, false).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::new(NAME, &request.model, format!("Failed to parse response: {e}"))
        })?;

        let content = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<String>();

        Ok(ChatResponse {
            provider: NAME.into(),
            model: anthropic_response.model,
            content,
            usage: TokenUsage {
                input_tokens: anthropic_response.usage.input_tokens,
                output_tokens: anthropic_response.usage.output_tokens,
                total_tokens: anthropic_response.usage.input_tokens
                    + anthropic_response.usage.output_tokens,
            },
            finish_reason: anthropic_response.stop_reason,
            latency_ms,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, ProviderError> {
        let response = self.send(&request, true).await?;
        Ok(sse::text_stream(response, NAME, &request.model, parse_stream_event))
    }
}

/// Map one streamed Messages API event to a text fragment.
fn parse_stream_event(data: &str) -> SseAction {
    let Ok(event) = serde_json::from_str::<StreamEvent>(data) else {
        tracing::debug!(data, "Skipping unparseable Anthropic stream event");
        return SseAction::Skip;
    };

    match event.event_type.as_str() {
        "content_block_delta" => match event.delta {
            Some(StreamDelta { text: Some(text) }) => SseAction::Text(text),
            _ => SseAction::Skip,
        },
        "message_stop" => SseAction::Done,
        "error" => SseAction::Error(
            event
                .error
                .map_or_else(|| "Unknown stream error".to_string(), |e| e.message),
        ),
        _ => SseAction::Skip,
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
