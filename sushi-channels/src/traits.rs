//! Messaging platform trait.

use crate::message::RawMessage;
use async_trait::async_trait;

/// Result type for platform operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Platform error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Platform API error in {method}: {error}")]
    Api { method: String, error: String },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reference to a posted message, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub ts: String,
}

/// Messaging platform the relay talks to.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Get the platform name.
    fn name(&self) -> &'static str;

    /// Fetch the conversation log, newest first. `None` fetches everything.
    async fn fetch_history(
        &self,
        channel: &str,
        limit: Option<usize>,
    ) -> ChannelResult<Vec<RawMessage>>;

    /// Post a new message.
    async fn post_message(&self, channel: &str, text: &str) -> ChannelResult<MessageHandle>;

    /// Replace the text of a previously posted message.
    async fn update_message(
        &self,
        channel: &str,
        handle: &MessageHandle,
        text: &str,
    ) -> ChannelResult<()>;
}
