//! Model invocation.
//!
//! The session talks to models through [`ModelInvoker`]; the production
//! implementation routes each model id through the provider registry.

use crate::message::{ChatMessage, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use sushi_common::config::LlmConfig;
use sushi_providers::{ChatRequest, Message, Provider, ProviderRegistry};

/// Incremental reply text.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Request/response contract for model calls.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Blocking completion.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Streamed completion; ends when the provider signals end-of-stream.
    async fn complete_stream(&self, model: &str, messages: &[ChatMessage])
        -> Result<FragmentStream>;
}

/// [`ModelInvoker`] backed by the provider registry.
pub struct RegistryInvoker {
    registry: Arc<ProviderRegistry>,
    max_tokens: i64,
    temperature: Option<f64>,
}

impl RegistryInvoker {
    pub fn new(registry: Arc<ProviderRegistry>, config: &LlmConfig) -> Self {
        Self {
            registry,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn provider(&self, model: &str) -> Result<Arc<dyn Provider>> {
        self.registry
            .get_for_model(model)
            .with_context(|| format!("No provider configured for model {model}"))
    }

    /// Leading system messages become the request's system prompt.
    fn request(&self, model: &str, messages: &[ChatMessage]) -> ChatRequest {
        let split = messages
            .iter()
            .position(|m| m.role != Role::System)
            .unwrap_or(messages.len());
        let (system, rest) = messages.split_at(split);

        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        });

        ChatRequest {
            model: model.to_string(),
            messages: rest
                .iter()
                .map(|m| Message {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            system,
        }
    }
}

#[async_trait]
impl ModelInvoker for RegistryInvoker {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let provider = self.provider(model)?;
        let response = provider.chat(self.request(model, messages)).await?;

        tracing::info!(
            provider = %response.provider,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            latency_ms = response.latency_ms,
            "Completion finished"
        );

        Ok(response.content)
    }

    async fn complete_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream> {
        let provider = self.provider(model)?;
        let stream = provider.chat_stream(self.request(model, messages)).await?;
        tracing::debug!(provider = provider.name(), model, "Streaming completion started");

        Ok(stream.map(|item| item.map_err(anyhow::Error::from)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sushi_providers::{ChatResponse, ProviderError, TextStream, TokenUsage};
    use tokio::sync::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn models(&self) -> Vec<&str> {
            vec!["test-model"]
        }

        fn supports_model(&self, model: &str) -> bool {
            model == "test-model"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.seen.lock().await.push(request.clone());
            Ok(ChatResponse {
                provider: "recording".into(),
                model: request.model,
                content: "pong".into(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".into()),
                latency_ms: 1,
            })
        }

        async fn chat_stream(&self, request: ChatRequest) -> Result<TextStream, ProviderError> {
            self.seen.lock().await.push(request);
            Ok(futures_util::stream::iter(vec![Ok("po".to_string()), Ok("ng".to_string())]).boxed())
        }
    }

    fn invoker() -> (RegistryInvoker, Arc<RecordingProvider>) {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        (
            RegistryInvoker::new(Arc::new(registry), &LlmConfig::default()),
            provider,
        )
    }

    #[tokio::test]
    async fn system_messages_move_to_the_system_prompt() {
        let (invoker, provider) = invoker();
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("ping"),
            ChatMessage::assistant("pong"),
            ChatMessage::user("again"),
        ];

        assert_eq!(invoker.complete("test-model", &messages).await.unwrap(), "pong");

        let seen = provider.seen.lock().await;
        assert_eq!(seen[0].system.as_deref(), Some("be brief"));
        let roles: Vec<&str> = seen[0].messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(seen[0].max_tokens, Some(LlmConfig::default().max_tokens));
    }

    #[tokio::test]
    async fn streams_fragments() {
        let (invoker, _) = invoker();
        let stream = invoker
            .complete_stream("test-model", &[ChatMessage::user("ping")])
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.concat(), "pong");
    }

    #[tokio::test]
    async fn unknown_model_is_an_error() {
        let (invoker, _) = invoker();
        let err = invoker
            .complete("nope", &[ChatMessage::user("ping")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No provider configured for model nope"));
    }
}
