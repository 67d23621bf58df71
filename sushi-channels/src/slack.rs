//! Slack Web API client.
//!
//! Implements [`Platform`] over `conversations.history`, `chat.postMessage`
//! and `chat.update`, authenticating with the bot token.

use crate::message::RawMessage;
use crate::traits::{ChannelError, ChannelResult, MessageHandle, Platform};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const SLACK_API: &str = "https://slack.com/api";

/// Largest page `conversations.history` accepts.
const MAX_PAGE_SIZE: usize = 200;

/// Slack platform client.
pub struct SlackClient {
    bot_token: String,
    api_base: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl SlackClient {
    /// Create a new Slack client.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(bot_token, SLACK_API)
    }

    /// Create with a custom API base URL.
    pub fn with_api_base(bot_token: impl Into<String>, api_base: &str) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// Check the HTTP status and Slack's `ok` flag, returning the body.
    async fn read_response(
        method: &str,
        resp: reqwest::Response,
    ) -> ChannelResult<serde_json::Value> {
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse {method} response: {e}")))?;

        if !data.get("ok").and_then(|o| o.as_bool()).unwrap_or(false) {
            let error = data
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(ChannelError::Api {
                method: method.to_string(),
                error,
            });
        }

        Ok(data)
    }

    async fn post_json(&self, method: &str, body: serde_json::Value) -> ChannelResult<serde_json::Value> {
        let resp = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Slack {method} error: {e}")))?;

        Self::read_response(method, resp).await
    }

    /// Verify the token and return the bot's own user id.
    pub async fn auth_test(&self) -> ChannelResult<String> {
        let resp = self
            .client
            .post(self.url("auth.test"))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| ChannelError::Auth(format!("Failed to verify Slack token: {e}")))?;

        let data = Self::read_response("auth.test", resp).await.map_err(|e| match e {
            ChannelError::Api { error, .. } => ChannelError::Auth(format!("Slack auth failed: {error}")),
            other => other,
        })?;

        data.get("user_id")
            .and_then(|u| u.as_str())
            .map(String::from)
            .ok_or_else(|| ChannelError::Auth("auth.test returned no user_id".into()))
    }
}

#[async_trait]
impl Platform for SlackClient {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn fetch_history(
        &self,
        channel: &str,
        limit: Option<usize>,
    ) -> ChannelResult<Vec<RawMessage>> {
        let mut messages: Vec<RawMessage> = Vec::new();
        let mut cursor = String::new();

        loop {
            let page_size = limit.map_or(MAX_PAGE_SIZE, |l| (l - messages.len()).min(MAX_PAGE_SIZE));
            let mut params = vec![
                ("channel", channel.to_string()),
                ("limit", page_size.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }

            let resp = self
                .client
                .get(self.url("conversations.history"))
                .bearer_auth(&self.bot_token)
                .query(&params)
                .send()
                .await
                .map_err(|e| ChannelError::Connection(format!("Slack history error: {e}")))?;

            let data = Self::read_response("conversations.history", resp).await?;
            let page: HistoryResponse = serde_json::from_value(data).map_err(|e| {
                ChannelError::Internal(format!("Malformed conversations.history payload: {e}"))
            })?;

            messages.extend(page.messages);

            let next = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            let reached_limit = limit.is_some_and(|l| messages.len() >= l);
            if !page.has_more || next.is_empty() || reached_limit {
                break;
            }
            cursor = next;
        }

        if let Some(l) = limit {
            messages.truncate(l);
        }

        tracing::debug!(channel, count = messages.len(), "Fetched Slack history");
        Ok(messages)
    }

    async fn post_message(&self, channel: &str, text: &str) -> ChannelResult<MessageHandle> {
        let data = self
            .post_json(
                "chat.postMessage",
                serde_json::json!({ "channel": channel, "text": text }),
            )
            .await?;

        let ts = data
            .get("ts")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ChannelError::SendFailed("chat.postMessage returned no ts".into()))?
            .to_string();

        Ok(MessageHandle { ts })
    }

    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        text: &str,
    ) -> ChannelResult<()> {
        self.post_json(
            "chat.update",
            serde_json::json!({ "channel": channel, "ts": handle.ts, "text": text }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_history_pages_until_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("channel", "D1"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "messages": [{"ts": "2", "user": "U1", "text": "older"}],
                "has_more": false
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(header("authorization", "Bearer xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "messages": [{"ts": "3", "user": "U1", "text": "newest"}],
                "has_more": true,
                "response_metadata": {"next_cursor": "page2"}
            })))
            .mount(&server)
            .await;

        let slack = SlackClient::with_api_base("xoxb-test", &server.uri());
        let messages = slack.fetch_history("D1", None).await.unwrap();
        let texts: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["newest", "older"]);

        let limited = slack.fetch_history("D1", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn api_errors_surface_method_and_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "channel_not_found"})),
            )
            .mount(&server)
            .await;

        let slack = SlackClient::with_api_base("xoxb-test", &server.uri());
        let err = slack.fetch_history("D404", Some(50)).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Api { ref method, ref error }
                if method == "conversations.history" && error == "channel_not_found"
        ));
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let slack = SlackClient::with_api_base("xoxb-test", &server.uri());
        let err = slack.post_message("D1", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::RateLimited { retry_after_secs: 7 }));
    }

    #[tokio::test]
    async fn post_then_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_partial_json(serde_json::json!({"channel": "D1", "text": "thinking"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "ts": "99.1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat.update"))
            .and(body_partial_json(serde_json::json!({"ts": "99.1", "text": "done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let slack = SlackClient::with_api_base("xoxb-test", &server.uri());
        let handle = slack.post_message("D1", "thinking").await.unwrap();
        assert_eq!(handle.ts, "99.1");
        slack.update_message("D1", &handle, "done").await.unwrap();
    }

    #[tokio::test]
    async fn auth_test_returns_bot_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": true, "user_id": "UBOT", "team": "sushi"}),
            ))
            .mount(&server)
            .await;

        let slack = SlackClient::with_api_base("xoxb-test", &server.uri());
        assert_eq!(slack.auth_test().await.unwrap(), "UBOT");
    }
}
