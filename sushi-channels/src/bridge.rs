//! Bridge between the Events API endpoint and chat sessions.
//!
//! The HTTP handler only forwards direct messages; this processor queues each
//! one behind earlier messages of the same conversation, runs it as a session
//! turn and reports failed turns back into the conversation.

use crate::banner::error_report;
use crate::message::IncomingMessage;
use crate::session::{SessionRegistry, TurnOutcome};
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use sushi_common::logging::generate_turn_id;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Runs forwarded messages through the session registry.
pub struct RelayBridge {
    registry: Arc<SessionRegistry>,
    /// One FIFO worker per (user, channel)
    queues: DashMap<(String, String), mpsc::UnboundedSender<IncomingMessage>>,
}

impl RelayBridge {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            queues: DashMap::new(),
        }
    }

    /// Queue a message behind earlier ones from the same conversation.
    ///
    /// Conversations run in parallel; turns within one run in delivery order.
    pub fn enqueue(self: &Arc<Self>, message: IncomingMessage) {
        let key = (message.user_id.clone(), message.channel_id.clone());
        let queue = self
            .queues
            .entry(key)
            .or_insert_with(|| self.spawn_worker())
            .clone();

        if let Err(e) = queue.send(message) {
            tracing::error!(
                user_id = %e.0.user_id,
                channel_id = %e.0.channel_id,
                "Conversation worker is gone, dropping message"
            );
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> mpsc::UnboundedSender<IncomingMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let _ = bridge.process(message).await;
            }
        });
        tx
    }

    /// Run one turn. Failures are posted to the user as an error report and
    /// returned.
    pub async fn process(&self, message: IncomingMessage) -> Result<TurnOutcome> {
        let turn_id = generate_turn_id();
        let span = tracing::info_span!(
            "turn",
            turn_id = %turn_id,
            user_id = %message.user_id,
            channel_id = %message.channel_id,
        );

        async {
            let started = std::time::Instant::now();
            match self.registry.handle(&message).await {
                Ok(outcome) => {
                    tracing::info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        outcome = ?outcome.action,
                        "Turn finished"
                    );
                    Ok(outcome)
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Turn failed");
                    let platform = &self.registry.context().platform;
                    if let Err(post_err) = platform
                        .post_message(&message.channel_id, &error_report(&e))
                        .await
                    {
                        tracing::error!(error = %post_err, "Failed to post error report");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Spawn the processor loop.
    pub fn spawn_processor(
        bridge: Arc<Self>,
        mut rx: mpsc::Receiver<IncomingMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Relay processor started");

            while let Some(message) = rx.recv().await {
                bridge.enqueue(message);
            }

            tracing::info!("Relay processor stopped");
        })
    }
}
