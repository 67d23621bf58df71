//! Google Gemini provider.

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

const NAME: &str = "gemini";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i64>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .flatten()
            .take(1)
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

impl GeminiProvider {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, "https://generativelanguage.googleapis.com")
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_request(request: &ChatRequest) -> GenerateContentRequest {
        let system_instruction = request.system.as_ref().map(|sys| Content {
            role: None,
            parts: vec![Part { text: sys.clone() }],
        });

        let contents = request
            .messages
            .iter()
            .map(|msg| Content {
                role: Some(match msg.role.as_str() {
                    "assistant" => "model".to_string(),
                    other => other.to_string(),
                }),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens.unwrap_or(8192),
            },
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/v1beta/{model_name}:{method}", self.base_url)
    }

    async fn send(
        &self,
        request: &ChatRequest,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint(&request.model, method))
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .json(&Self::build_request(request))
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
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn models(&self) -> Vec<&str> {
        KnownModel::ids_for(Backend::Gemini)
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("gemini-")
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let response = self.send(&request, "generateContent", &[]).await?;

        let result: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new(NAME, &request.model, format!("Failed to parse response: {e}"))
        })?;

        if let Some(err) = &result.error {
            return Err(ProviderError::new(NAME, &request.model, format!("API error: {}", err.message)));
        }

        let content = result.text();
        let finish_reason = result
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::new(NAME, &request.model, "No response from Gemini"))?
            .finish_reason
            .clone();

        let usage = result.usage_metadata.map_or(TokenUsage::default(), |u| TokenUsage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count.unwrap_or(0),
        });

        Ok(ChatResponse {
            provider: NAME.into(),
            model: request.model,
            content,
            usage,
            finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, ProviderError> {
        let response = self
            .send(&request, "streamGenerateContent", &[("alt", "sse")])
            .await?;
        Ok(sse::text_stream(response, NAME, &request.model, parse_stream_chunk))
    }
}

fn parse_stream_chunk(data: &str) -> SseAction {
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(GenerateContentResponse { error: Some(err), .. }) => SseAction::Error(err.message),
        Ok(chunk) => SseAction::Text(chunk.text()),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable Gemini chunk");
            SseAction::Skip
        }
    }
}
