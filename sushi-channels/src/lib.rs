//! Sushi Channels - the Slack side of the SushiBot relay.
//!
//! ## Architecture
//!
//! Slack delivers direct messages to the Events API endpoint, which forwards
//! them to the relay processor. Each turn re-reads the conversation from
//! Slack, rebuilds the model-facing history, applies session commands and
//! answers through the selected model.
//!
//! ```text
//! Slack DM → /slack/events → RelayBridge → ChatSession → ModelInvoker
//!                                              ↓
//! Slack   ←──── post / update ←──────── StreamingReply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod banner;
pub mod bridge;
pub mod command;
pub mod fetch;
pub mod history;
pub mod llm;
pub mod message;
pub mod routes;
pub mod session;
pub mod slack;
pub mod stream;
pub mod traits;

// Re-export commonly used types
pub use bridge::RelayBridge;
pub use command::{Command, CommandSyntax};
pub use fetch::{BoundedCache, FetchError, Resources, WebResources};
pub use history::{HistoryReconstructor, Reconstruction, RecordedCommand};
pub use llm::{ModelInvoker, RegistryInvoker};
pub use message::{ChatMessage, FileRef, IncomingMessage, RawMessage, RichElement, Role};
pub use routes::{build_router, create_state, ChannelsState};
pub use session::{
    ChatSession, SessionContext, SessionRegistry, SessionState, TurnAction, TurnOutcome,
};
pub use slack::SlackClient;
pub use traits::{ChannelError, ChannelResult, MessageHandle, Platform};

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use sushi_common::config::Config;
use tower_http::cors::{Any, CorsLayer};

/// Build the session registry with the production collaborators.
pub fn build_registry(config: &Config, platform: Arc<dyn Platform>) -> SessionRegistry {
    let providers = sushi_providers::create_registry(&config.secrets.llm);
    if providers.is_empty() {
        tracing::warn!("No LLM provider API keys configured; every model call will fail");
    } else {
        tracing::info!(providers = ?providers.list_providers(), "LLM providers registered");
    }
    let invoker = Arc::new(RegistryInvoker::new(Arc::new(providers), &config.llm));

    let resources = Arc::new(WebResources::new(
        config.secrets.slack.bot_token.clone(),
        &config.fetchers,
        Arc::new(BoundedCache::new()),
    ));
    let reconstructor =
        HistoryReconstructor::new(CommandSyntax::from_config(&config.session), resources);

    SessionRegistry::new(SessionContext::new(config, platform, invoker, reconstructor))
}

/// Build the HTTP router with CORS middleware.
pub fn build_app_router(
    config: &Config,
    bot_user_id: Option<String>,
    platform: Arc<dyn Platform>,
) -> (axum::Router, tokio::sync::mpsc::Receiver<IncomingMessage>) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let (state, rx) = create_state(
        config.secrets.slack.signing_secret.clone(),
        bot_user_id,
        Some(platform),
    );
    if state.signing_secret.is_none() {
        tracing::warn!("No Slack signing secret configured; requests are not verified");
    }

    (build_router(state).layer(cors), rx)
}

/// Start the relay HTTP server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .listen_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_address()))?;

    let slack = Arc::new(SlackClient::new(config.slack_bot_token()));
    let bot_user_id = match slack.auth_test().await {
        Ok(id) => {
            tracing::info!(bot_user_id = %id, "Authenticated with Slack");
            Some(id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Slack auth.test failed; own messages are filtered by bot_id only");
            None
        }
    };

    let platform: Arc<dyn Platform> = slack;
    let registry = Arc::new(build_registry(config, platform.clone()));
    let (router, rx) = build_app_router(config, bot_user_id, platform);

    // Spawn the message processor
    let bridge = Arc::new(RelayBridge::new(registry));
    let processor_handle = RelayBridge::spawn_processor(bridge, rx);

    tracing::info!("Starting SushiBot on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    processor_handle.abort();

    Ok(())
}
