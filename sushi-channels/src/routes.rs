//! HTTP routes for the Slack Events API.
//!
//! - `GET /health`, `GET /ready`: liveness and readiness
//! - `POST /slack/events`: signed event deliveries from Slack
//!
//! Direct messages are acknowledged right away and forwarded to the
//! processor over a channel; Slack expects an answer within three seconds.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::banner::MENTION_REPLY;
use crate::message::IncomingMessage;
use crate::traits::Platform;

/// Requests older than this are rejected as replays.
const SIGNATURE_WINDOW_SECS: i64 = 60 * 5;

// ============================================================================
// State
// ============================================================================

/// Shared state for the HTTP server.
pub struct ChannelsState {
    /// Channel for forwarding direct messages to the processor
    pub message_tx: mpsc::Sender<IncomingMessage>,
    /// Slack signing secret; requests are not verified when absent
    pub signing_secret: Option<Arc<str>>,
    /// The bot's own user id, to ignore its own messages
    pub bot_user_id: Option<String>,
    /// Client used to answer channel mentions
    pub mention_platform: Option<Arc<dyn Platform>>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    challenge: Option<String>,
}

impl WebhookResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
            challenge: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            challenge: None,
        }
    }
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "sushibot",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    // Processor gone means nothing will answer
    if state.message_tx.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready",
                service: "sushibot",
                version: env!("CARGO_PKG_VERSION"),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            service: "sushibot",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// Slack Events
// ============================================================================

/// Outer Events API payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SlackEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Other,
}

/// The subset of an inner event the relay reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackEvent {
    #[serde(rename = "type")]
    kind: String,
    subtype: Option<String>,
    channel_type: Option<String>,
    user: Option<String>,
    bot_id: Option<String>,
    channel: String,
    text: String,
    ts: String,
}

/// Verify the `X-Slack-Signature` header against the raw body.
///
/// See: <https://api.slack.com/authentication/verifying-requests-from-slack>
pub fn verify_slack_signature(
    signing_secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> sushi_common::Result<()> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use sushi_common::Error;

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let timestamp = header("X-Slack-Request-Timestamp")
        .ok_or_else(|| Error::Auth("missing request timestamp".into()))?;
    let signature = header("X-Slack-Signature")
        .ok_or_else(|| Error::Auth("missing signature".into()))?;

    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad request timestamp: {timestamp}")))?;
    if (now - sent_at).abs() > SIGNATURE_WINDOW_SECS {
        return Err(Error::Auth("stale request timestamp".into()));
    }

    // Signature format: "v0=<hex_signature>"
    let expected = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| Error::Auth("malformed signature".into()))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes())
        .map_err(|e| Error::Internal(e.to_string()))?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| Error::Auth("signature mismatch".into()))
}

fn status_of(error: &sushi_common::Error) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// POST /slack/events
async fn slack_events(
    State(state): State<Arc<ChannelsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // ── Security: verify the request signature if a secret is configured ──
    if let Some(ref secret) = state.signing_secret {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = verify_slack_signature(secret, &headers, &body, now) {
            tracing::warn!(error = %e, "Slack signature verification failed");
            return (status_of(&e), Json(WebhookResponse::failed(e.to_string())));
        }
    }

    let envelope: SlackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            let e = sushi_common::Error::from(e);
            tracing::warn!(error = %e, "Unparseable Slack payload");
            return (status_of(&e), Json(WebhookResponse::failed(e.to_string())));
        }
    };

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            tracing::info!("Slack URL verification");
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    success: true,
                    message: None,
                    challenge: Some(challenge),
                }),
            )
        }
        SlackEnvelope::EventCallback { event } => {
            // Slack redelivers when we are slow; the first delivery is
            // already being handled.
            if let Some(retry) = headers.get("X-Slack-Retry-Num").and_then(|v| v.to_str().ok()) {
                tracing::debug!(retry, kind = %event.kind, "Dropping Slack retry");
                return (StatusCode::OK, Json(WebhookResponse::ok()));
            }
            handle_event(&state, event).await
        }
        SlackEnvelope::Other => (StatusCode::OK, Json(WebhookResponse::ok())),
    }
}

async fn handle_event(
    state: &ChannelsState,
    event: SlackEvent,
) -> (StatusCode, Json<WebhookResponse>) {
    match event.kind.as_str() {
        "message" => {
            let Some(user_id) = event.user.clone() else {
                return (StatusCode::OK, Json(WebhookResponse::ok()));
            };
            let from_bot = event.bot_id.is_some()
                || state.bot_user_id.as_deref() == Some(user_id.as_str());
            let direct = event.channel_type.as_deref() == Some("im");
            // plain posts and uploads start a turn; edits, deletions and joins do not
            let user_post = matches!(event.subtype.as_deref(), None | Some("file_share"));
            if !user_post || from_bot || !direct {
                return (StatusCode::OK, Json(WebhookResponse::ok()));
            }

            let incoming = IncomingMessage {
                user_id,
                channel_id: event.channel,
                text: event.text,
                ts: event.ts,
            };
            tracing::info!(
                user_id = %incoming.user_id,
                channel_id = %incoming.channel_id,
                ts = %incoming.ts,
                "Direct message received"
            );

            if let Err(e) = state.message_tx.send(incoming).await {
                tracing::error!("Failed to forward Slack message: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(WebhookResponse::failed(format!("Failed to forward message: {e}"))),
                );
            }
            (StatusCode::OK, Json(WebhookResponse::ok()))
        }
        "app_mention" => {
            if let Some(platform) = state.mention_platform.clone() {
                let channel = event.channel;
                tokio::spawn(async move {
                    if let Err(e) = platform.post_message(&channel, MENTION_REPLY).await {
                        tracing::warn!(channel = %channel, error = %e, "Failed to answer mention");
                    }
                });
            }
            (StatusCode::OK, Json(WebhookResponse::ok()))
        }
        other => {
            tracing::debug!(kind = other, "Ignoring Slack event");
            (StatusCode::OK, Json(WebhookResponse::ok()))
        }
    }
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the HTTP router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Slack Events API
        .route("/slack/events", post(slack_events))
        .with_state(state)
}

/// Create server state with a message receiver.
pub fn create_state(
    signing_secret: Option<String>,
    bot_user_id: Option<String>,
    mention_platform: Option<Arc<dyn Platform>>,
) -> (Arc<ChannelsState>, mpsc::Receiver<IncomingMessage>) {
    let (tx, rx) = mpsc::channel(100);

    let state = Arc::new(ChannelsState {
        message_tx: tx,
        signing_secret: signing_secret.filter(|s| !s.is_empty()).map(Arc::from),
        bot_user_id,
        mention_platform,
    });

    (state, rx)
}
