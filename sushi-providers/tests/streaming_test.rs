//! HTTP-level tests for the provider backends.

use futures_util::StreamExt;
use sushi_providers::{
    AnthropicProvider, AuthStyle, ChatRequest, CompatibleProvider, GeminiProvider, Message,
    Provider,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(model: &str) -> ChatRequest {
    ChatRequest {
        model: model.into(),
        messages: vec![Message {
            role: "user".into(),
            content: "hello".into(),
        }],
        max_tokens: Some(256),
        temperature: None,
        system: Some("be nice".into()),
    }
}

async fn collect(provider: &dyn Provider, model: &str) -> Vec<Result<String, String>> {
    let stream = provider.chat_stream(request(model)).await.unwrap();
    stream
        .map(|item| item.map_err(|e| e.message))
        .collect()
        .await
}

#[tokio::test]
async fn anthropic_streams_text_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
        "event: ping\n",
        "data: {\"type\":\"ping\"}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(body_partial_json(serde_json::json!({"stream": true, "system": "be nice"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_base_url("sk-test", &server.uri());
    let items = collect(&provider, "claude-3-haiku-20240307").await;
    assert_eq!(items, vec![Ok("Hi ".to_string()), Ok("there".to_string())]);
}

#[tokio::test]
async fn anthropic_one_shot_joins_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "claude-3-haiku-20240307",
            "content": [{"type": "text", "text": "Hello"}, {"type": "text", "text": " world"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 4, "output_tokens": 2}
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::with_base_url("sk-test", &server.uri());
    let response = provider.chat(request("claude-3-haiku-20240307")).await.unwrap();
    assert_eq!(response.content, "Hello world");
    assert_eq!(response.usage.total_tokens, 6);
}

#[tokio::test]
async fn compatible_stream_stops_at_done() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"One\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" two\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = CompatibleProvider::new(
        "groq",
        &server.uri(),
        "gsk",
        AuthStyle::Bearer,
        vec!["llama3-70b-8192"],
    );
    let items = collect(&provider, "llama3-70b-8192").await;
    assert_eq!(items, vec![Ok("One".to_string()), Ok(" two".to_string())]);
}

#[tokio::test]
async fn error_status_is_reported_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = CompatibleProvider::new("openai", &server.uri(), "bad", AuthStyle::Bearer, vec!["gpt-4o"]);
    let err = match provider.chat_stream(request("gpt-4o")).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert_eq!(err.status_code, Some(401));
    assert!(err.message.contains("invalid api key"));
}

#[tokio::test]
async fn gemini_streams_with_alt_sse() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Ciao\"}],\"role\":\"model\"}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}]}\r\n\r\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash-latest:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(query_param("key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = GeminiProvider::with_base_url("g-key", &server.uri());
    let items = collect(&provider, "gemini-1.5-flash-latest").await;
    assert_eq!(items, vec![Ok("Ciao".to_string()), Ok("!".to_string())]);
}
