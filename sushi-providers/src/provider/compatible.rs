//! Generic OpenAI-compatible provider.
//!
//! OpenAI, Groq and Fireworks all follow the same `/v1/chat/completions`
//! format, so a single implementation serves all of them.

use super::sse::{self, SseAction};
use super::{
    error_from_response, ChatRequest, ChatResponse, Provider, ProviderError, TextStream,
    TokenUsage,
};
use crate::catalog::{Backend, KnownModel};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How the provider expects the API key to be sent.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Custom header name
    Custom(String),
}

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct CompatibleProvider {
    name: String,
    base_url: String,
    api_key: String,
    auth_style: AuthStyle,
    models: Vec<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompatibleRequest {
    model: String,
    messages: Vec<CompatibleMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompatibleMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompatibleResponse {
    choices: Vec<CompatibleChoice>,
    #[serde(default)]
    usage: Option<CompatibleUsage>,
}

#[derive(Debug, Deserialize)]
struct CompatibleChoice {
    message: CompatibleResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompatibleResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompatibleUsage {
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// o1-family models reject system messages, `temperature` and `max_tokens`.
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1")
}

impl CompatibleProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: &str,
        auth_style: AuthStyle,
        models: Vec<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            auth_style,
            models: models.into_iter().map(ToString::to_string).collect(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create OpenAI provider.
    pub fn openai(api_key: &str) -> Self {
        Self::new(
            Backend::OpenAI.as_str(),
            "https://api.openai.com",
            api_key,
            AuthStyle::Bearer,
            KnownModel::ids_for(Backend::OpenAI),
        )
    }

    /// Create Groq provider.
    pub fn groq(api_key: &str) -> Self {
        Self::new(
            Backend::Groq.as_str(),
            "https://api.groq.com/openai",
            api_key,
            AuthStyle::Bearer,
            KnownModel::ids_for(Backend::Groq),
        )
    }

    /// Create Fireworks AI provider.
    pub fn fireworks(api_key: &str) -> Self {
        Self::new(
            Backend::Fireworks.as_str(),
            "https://api.fireworks.ai/inference",
            api_key,
            AuthStyle::Bearer,
            KnownModel::ids_for(Backend::Fireworks),
        )
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> CompatibleRequest {
        let reasoning = is_reasoning_model(&request.model);
        let mut messages: Vec<CompatibleMessage> = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(CompatibleMessage {
                role: if reasoning { "user" } else { "system" }.to_string(),
                content: system.clone(),
            });
        }

        for msg in &request.messages {
            match messages.last_mut() {
                // keep roles alternating when the system prompt was demoted
                Some(last) if reasoning && last.role == msg.role => {
                    last.content.push('\n');
                    last.content.push_str(&msg.content);
                }
                _ => messages.push(CompatibleMessage {
                    role: msg.role.clone(),
                    content: msg.content.clone(),
                }),
            }
        }

        CompatibleRequest {
            model: request.model.clone(),
            messages,
            temperature: if reasoning { None } else { request.temperature },
            max_tokens: if reasoning { None } else { request.max_tokens },
            max_completion_tokens: if reasoning { request.max_tokens } else { None },
            stream,
        }
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&self.build_request(request, stream));

        match &self.auth_style {
            AuthStyle::Bearer => {
                req = req.bearer_auth(&self.api_key);
            }
            AuthStyle::Custom(header) => {
                req = req.header(header.as_str(), self.api_key.as_str());
            }
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::new(&self.name, &request.model, format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.name, &request.model, response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for CompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<&str> {
        self.models.iter().map(String::as_str).collect()
    }

    fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let response = self.send(&request, false).await?;

        let result: CompatibleResponse = response.json().await.map_err(|e| {
            ProviderError::new(&self.name, &request.model, format!("Failed to parse response: {e}"))
        })?;

        let choice = result.choices.into_iter().next().ok_or_else(|| {
            ProviderError::new(&self.name, &request.model, format!("No response from {}", self.name))
        })?;

        let usage = result.usage.map_or(TokenUsage::default(), |u| TokenUsage {
            input_tokens: u.prompt_tokens.unwrap_or(0),
            output_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        });

        Ok(ChatResponse {
            provider: self.name.clone(),
            model: request.model,
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, ProviderError> {
        let response = self.send(&request, true).await?;
        Ok(sse::text_stream(response, &self.name, &request.model, parse_stream_chunk))
    }
}

fn parse_stream_chunk(data: &str) -> SseAction {
    if data.trim() == "[DONE]" {
        return SseAction::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(StreamChunk { error: Some(err), .. }) => SseAction::Error(err.message),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map_or(SseAction::Skip, SseAction::Text),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable completion chunk");
            SseAction::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.into(),
            messages: vec![Message {
                role: "user".into(),
                content: "Hello".into(),
            }],
            max_tokens: Some(512),
            temperature: Some(0.5),
            system: Some("Be brief".into()),
        }
    }

    #[test]
    fn groq_provider_creation() {
        let provider = CompatibleProvider::groq("gsk");
        assert_eq!(provider.name(), "groq");
        assert!(provider.supports_model("llama3-70b-8192"));
        assert!(!provider.supports_model("gpt-4o"));
    }

    #[test]
    fn strips_trailing_slash() {
        let provider = CompatibleProvider::new("custom", "http://localhost:8080/", "k", AuthStyle::Bearer, vec![]);
        assert_eq!(provider.base_url, "http://localhost:8080");
    }

    #[test]
    fn request_puts_system_first() {
        let provider = CompatibleProvider::openai("sk");
        let json = serde_json::to_value(provider.build_request(&request("gpt-4o"), true)).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn reasoning_models_fold_system_into_user_turn() {
        let provider = CompatibleProvider::openai("sk");
        let json = serde_json::to_value(provider.build_request(&request("o1-mini"), false)).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Be brief\nHello");
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_completion_tokens"], 512);
    }

    #[test]
    fn parses_stream_chunks() {
        assert_eq!(
            parse_stream_chunk(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseAction::Text("Hel".into())
        );
        assert_eq!(parse_stream_chunk(r#"{"choices":[{"delta":{}}]}"#), SseAction::Skip);
        assert_eq!(parse_stream_chunk("[DONE]"), SseAction::Done);
        assert_eq!(
            parse_stream_chunk(r#"{"error":{"message":"rate limited"}}"#),
            SseAction::Error("rate limited".into())
        );
    }

    #[test]
    fn response_deserializes() {
        let json = r#"{"choices":[{"message":{"content":"Hi there"},"finish_reason":"stop"}],
                       "usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#;
        let parsed: CompatibleResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi there"));
        assert_eq!(parsed.usage.unwrap().total_tokens, Some(5));
    }
}
