//! Chat sessions.
//!
//! A [`ChatSession`] owns the per-conversation [`SessionState`] and runs one
//! turn at a time: reconstruct the history from the platform log, replay
//! commands the session has not applied yet, then either answer a live
//! command or call the model.
//!
//! State is derived from the command log. Replayed commands are tracked by a
//! timestamp watermark so that a toggle is applied exactly once per process,
//! and a failed turn commits neither the state nor the watermark.

use crate::banner::{help_text, onboarding_text};
use crate::command::{Command, CommandSyntax};
use crate::history::{HistoryReconstructor, Reconstruction};
use crate::llm::ModelInvoker;
use crate::message::{merge_adjacent, ChatMessage, IncomingMessage};
use crate::stream;
use crate::traits::Platform;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::sync::Arc;
use sushi_common::config::Config;
use sushi_providers::catalog::display_name_for;
use tokio::sync::Mutex;

// ============================================================================
// Session State
// ============================================================================

/// Mutable per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub current_model: String,
    pub streaming_enabled: bool,
}

impl SessionState {
    pub fn new(default_model: impl Into<String>, streaming_enabled: bool) -> Self {
        Self {
            current_model: default_model.into(),
            streaming_enabled,
        }
    }

    /// Apply a command's effect on state. Reset, who and help change nothing.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SelectModel(model) => self.current_model = model.id().to_string(),
            Command::ToggleStream => self.streaming_enabled = !self.streaming_enabled,
            Command::DisableStream => self.streaming_enabled = false,
            Command::Reset | Command::Who | Command::Help => {}
        }
    }

    pub fn model_name(&self) -> &str {
        display_name_for(&self.current_model)
    }

    /// Apply a live command and produce its acknowledgement.
    fn execute(&mut self, command: Command, syntax: &CommandSyntax) -> String {
        self.apply(command);
        match command {
            Command::Reset => "Session has been reset.".to_string(),
            Command::Who => format!("Current model is {}.", self.model_name()),
            Command::SelectModel(model) => format!("Model set to {}.", model.display_name()),
            Command::ToggleStream | Command::DisableStream => {
                if self.streaming_enabled {
                    "Streaming enabled.".to_string()
                } else {
                    "Streaming disabled.".to_string()
                }
            }
            Command::Help => help_text(syntax),
        }
    }
}

// ============================================================================
// Turn Context
// ============================================================================

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub platform: Arc<dyn Platform>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub reconstructor: HistoryReconstructor,
    pub system_prompt: String,
    /// Raw log window; `None` reads the whole conversation.
    pub history_limit: Option<usize>,
    /// State for sessions created on first contact.
    pub defaults: SessionState,
}

impl SessionContext {
    pub fn new(
        config: &Config,
        platform: Arc<dyn Platform>,
        invoker: Arc<dyn ModelInvoker>,
        reconstructor: HistoryReconstructor,
    ) -> Self {
        Self {
            platform,
            invoker,
            reconstructor,
            system_prompt: config.llm.system_prompt.clone(),
            history_limit: config.session.history_limit,
            defaults: SessionState::new(
                config.llm.default_model.clone(),
                config.session.streaming_default,
            ),
        }
    }

    fn syntax(&self) -> &CommandSyntax {
        self.reconstructor.syntax()
    }
}

/// What a turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Whether the onboarding banner was posted first.
    pub onboarded: bool,
    pub action: TurnAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAction {
    /// A live command was executed and acknowledged.
    Command { command: Command, reply: String },
    /// The model answered.
    Reply {
        model: String,
        streamed: bool,
        messages_posted: usize,
    },
}

// ============================================================================
// Chat Session
// ============================================================================

/// Slack timestamps (`1700000000.000100`) as comparable pairs.
fn ts_key(ts: &str) -> (u64, u64) {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    (secs.parse().unwrap_or(0), frac.parse().unwrap_or(0))
}

fn is_newer(ts: &str, watermark: Option<&str>) -> bool {
    watermark.map_or(true, |mark| ts_key(ts) > ts_key(mark))
}

/// One conversation between a user and the bot.
#[derive(Debug)]
pub struct ChatSession {
    user_id: String,
    channel_id: String,
    state: SessionState,
    /// Timestamp of the newest command already applied to `state`.
    last_applied_ts: Option<String>,
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            state,
            last_applied_ts: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Run one turn for an incoming message.
    pub async fn process_incoming(
        &mut self,
        ctx: &SessionContext,
        incoming: &IncomingMessage,
    ) -> Result<TurnOutcome> {
        let raw_log = ctx
            .platform
            .fetch_history(&self.channel_id, ctx.history_limit)
            .await
            .context("Failed to fetch conversation history")?;

        let Reconstruction {
            mut history,
            commands,
        } = ctx.reconstructor.reconstruct(&raw_log, &self.user_id).await;

        let syntax = ctx.syntax();
        let text = incoming.text.trim();
        let live_is_command = syntax.is_command(text);

        let onboarded = history.len() < 2 && commands.is_empty() && !live_is_command;
        if onboarded {
            ctx.platform
                .post_message(&self.channel_id, &onboarding_text(syntax))
                .await
                .context("Failed to post onboarding banner")?;
        }

        // Historical commands first, oldest to newest. The live message is
        // usually the newest log entry, so this is every command but the
        // most recent one, followed by the most recent when the live text
        // is not a command of its own.
        let mut state = self.state.clone();
        let mut watermark = self.last_applied_ts.clone();
        for recorded in &commands {
            if recorded.ts == incoming.ts || !is_newer(&recorded.ts, watermark.as_deref()) {
                continue;
            }
            if let Some(command) = syntax.parse(&recorded.text) {
                state.apply(command);
                tracing::debug!(command = %recorded.text, "Replayed command");
            }
            watermark = Some(recorded.ts.clone());
        }

        if live_is_command {
            if let Some(command) = syntax.parse(text) {
                let reply = state.execute(command, syntax);
                ctx.platform
                    .post_message(&self.channel_id, &reply)
                    .await
                    .context("Failed to post command reply")?;

                self.commit(state, watermark, &incoming.ts);
                tracing::info!(?command, model = %self.state.current_model, "Command executed");
                return Ok(TurnOutcome {
                    onboarded,
                    action: TurnAction::Command { command, reply },
                });
            }
        }

        // Unrecognized commands were scrubbed from the log; they reach the
        // model as plain text, as does a message the log does not show yet.
        let in_log = raw_log.iter().any(|m| m.ts == incoming.ts);
        if !text.is_empty() && (live_is_command || !in_log) {
            history.push(ChatMessage::user(text));
            history = merge_adjacent(history);
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(ctx.system_prompt.clone()));
        messages.extend(history);

        let model = state.current_model.clone();
        tracing::info!(
            model = %model,
            streaming = state.streaming_enabled,
            messages = messages.len(),
            "Calling model"
        );

        let action = if state.streaming_enabled {
            let fragments = ctx
                .invoker
                .complete_stream(&model, &messages)
                .await
                .with_context(|| format!("Model invocation failed ({model})"))?;
            let summary = stream::relay(ctx.platform.as_ref(), &self.channel_id, fragments).await?;
            TurnAction::Reply {
                model,
                streamed: true,
                messages_posted: summary.messages_posted,
            }
        } else {
            let reply = ctx
                .invoker
                .complete(&model, &messages)
                .await
                .with_context(|| format!("Model invocation failed ({model})"))?;
            let reply = if reply.trim().is_empty() { "...".to_string() } else { reply };
            ctx.platform
                .post_message(&self.channel_id, &reply)
                .await
                .context("Failed to post reply")?;
            TurnAction::Reply {
                model,
                streamed: false,
                messages_posted: 1,
            }
        };

        self.commit(state, watermark, &incoming.ts);
        Ok(TurnOutcome { onboarded, action })
    }

    fn commit(&mut self, state: SessionState, watermark: Option<String>, live_ts: &str) {
        self.state = state;
        self.last_applied_ts = match watermark {
            Some(mark) if !live_ts.is_empty() && is_newer(live_ts, Some(&mark)) => {
                Some(live_ts.to_string())
            }
            Some(mark) => Some(mark),
            None if !live_ts.is_empty() => Some(live_ts.to_string()),
            None => None,
        };
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// Live sessions keyed by `(user, channel)`.
///
/// Sessions are created on first contact and kept for the life of the
/// process. Each one sits behind its own async mutex so turns for the same
/// conversation run one at a time.
pub struct SessionRegistry {
    context: SessionContext,
    sessions: DashMap<(String, String), Arc<Mutex<ChatSession>>>,
}

impl SessionRegistry {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            sessions: DashMap::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Session for a conversation, created with the defaults if absent.
    pub fn session(&self, user_id: &str, channel_id: &str) -> Arc<Mutex<ChatSession>> {
        self.sessions
            .entry((user_id.to_string(), channel_id.to_string()))
            .or_insert_with(|| {
                tracing::info!(user_id, channel_id, "Creating session");
                Arc::new(Mutex::new(ChatSession::new(
                    user_id,
                    channel_id,
                    self.context.defaults.clone(),
                )))
            })
            .clone()
    }

    /// Run a turn under the session's lock.
    pub async fn handle(&self, incoming: &IncomingMessage) -> Result<TurnOutcome> {
        let session = self.session(&incoming.user_id, &incoming.channel_id);
        let mut session = session.lock().await;
        session.process_incoming(&self.context, incoming).await
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
