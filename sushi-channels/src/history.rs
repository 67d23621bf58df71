//! History reconstruction.
//!
//! Rebuilds the model-facing conversation from the platform's newest-first
//! message log on every turn. Commands are pulled out of the log together
//! with their one reply, fixed bot texts are neutralized, and attachments and
//! links are expanded into tagged text in log order.
//!
//! # Ordering
//!
//! The scan runs newest-first and reverses once at the end. Entries derived
//! from a single raw message are pushed in reverse so that, after the final
//! reversal, each message reads body first, then links, then attachments.

use crate::banner::{BANNER_SENTINEL, ERROR_HEADER};
use crate::command::{Command, CommandSyntax};
use crate::fetch::Resources;
use crate::message::{merge_adjacent, ChatMessage, FileRef, RawMessage, Role};
use std::sync::Arc;

/// Placeholder for a previous error report.
pub const UNKNOWN_ERROR: &str = "<Unknown Error />";

/// Opening user turn inserted when the history starts with the assistant.
pub const OPENING_PLACEHOLDER: &str = "...";

/// A command found in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Platform timestamp of the command message.
    pub ts: String,
    /// Trimmed command text, e.g. `\sonnet`.
    pub text: String,
}

/// Result of a reconstruction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// Chronological, role-alternating history opening with a user turn.
    pub history: Vec<ChatMessage>,
    /// Chronological commands newer than the last reset (reset included).
    pub commands: Vec<RecordedCommand>,
}

impl Reconstruction {
    pub fn command_texts(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Turns a raw platform log into normalized history plus commands.
#[derive(Clone)]
pub struct HistoryReconstructor {
    syntax: CommandSyntax,
    resources: Arc<dyn Resources>,
}

impl HistoryReconstructor {
    pub fn new(syntax: CommandSyntax, resources: Arc<dyn Resources>) -> Self {
        Self { syntax, resources }
    }

    pub fn syntax(&self) -> &CommandSyntax {
        &self.syntax
    }

    /// Reconstruct from a newest-first log as seen by `user_id`.
    ///
    /// Resource failures degrade to omitted entries; this never fails.
    pub async fn reconstruct(&self, raw_log: &[RawMessage], user_id: &str) -> Reconstruction {
        let mut history: Vec<ChatMessage> = Vec::new();
        let mut commands: Vec<RecordedCommand> = Vec::new();
        // entries the bot message just after the one being scanned contributed
        let mut newer_entries = 0;

        for raw in raw_log {
            let sent_by_user = raw.is_from(user_id);
            let body = raw.text.trim();

            if self.syntax.is_command(body) {
                // the reply directly follows its command; a skipped banner reply removes nothing
                history.truncate(history.len() - newer_entries);
                newer_entries = 0;
                commands.push(RecordedCommand {
                    ts: raw.ts.clone(),
                    text: body.to_string(),
                });
                if self.syntax.parse(body) == Some(Command::Reset) {
                    break;
                }
                continue;
            }

            if raw.text.starts_with(ERROR_HEADER) {
                history.push(ChatMessage::assistant(UNKNOWN_ERROR));
                newer_entries = 1;
                continue;
            }

            if raw.text.starts_with(BANNER_SENTINEL) {
                newer_entries = 0;
                continue;
            }

            let entries = self.expand(raw, sent_by_user).await;
            newer_entries = if sent_by_user { 0 } else { entries.len() };
            history.extend(entries.into_iter().rev());
        }

        history.reverse();
        if history.first().is_some_and(|m| m.role != Role::User) {
            history.insert(0, ChatMessage::user(OPENING_PLACEHOLDER));
        }
        commands.reverse();

        tracing::debug!(
            entries = history.len(),
            commands = commands.len(),
            "Reconstructed history"
        );

        Reconstruction {
            history: merge_adjacent(history),
            commands,
        }
    }

    /// Entries for one message in reading order.
    async fn expand(&self, raw: &RawMessage, sent_by_user: bool) -> Vec<ChatMessage> {
        let role = if sent_by_user { Role::User } else { Role::Assistant };
        let mut entries = Vec::new();

        if !raw.text.is_empty() {
            entries.push(ChatMessage::new(role, raw.text.clone()));
        }

        let mut attachments: Vec<FileRef> = raw.files.clone();

        if sent_by_user {
            for url in raw.links() {
                let content_type = self.resources.probe_content_type(url).await;
                if let Some(mimetype) = content_type.filter(|ct| is_attachable(ct)) {
                    attachments.push(FileRef {
                        name: url.to_string(),
                        url_private: url.to_string(),
                        mimetype,
                    });
                } else if self.resources.is_video_link(url) {
                    if let Some(transcript) = self.resources.fetch_video_transcript(url).await {
                        entries.push(ChatMessage::user(format!(
                            "<YoutubeTranscript url={url}>{transcript}</YoutubeTranscript>"
                        )));
                    }
                } else if let Some(text) = self.resources.scrape_page_text(url).await {
                    entries.push(ChatMessage::user(format!(
                        "<ScrapedTextFromURL url={url}>{text}</ScrapedTextFromURL>"
                    )));
                }
            }
        }

        for file in &attachments {
            if let Some(content) = self.describe_attachment(file).await {
                entries.push(ChatMessage::new(role, content));
            }
        }

        entries
    }

    async fn describe_attachment(&self, file: &FileRef) -> Option<String> {
        let mimetype = file.mimetype.as_str();

        if mimetype.starts_with("image/") {
            return Some(format!("<Image name={}/>", file.name));
        }

        match mimetype {
            "text/plain" => self
                .resources
                .fetch_text_file(&file.url_private)
                .await
                .map(|text| format!("<File mimetype=text/plain>{text}</File>")),
            "application/pdf" => {
                match self.resources.extract_document_text(&file.url_private).await {
                    Ok(text) => Some(format!("<File mimetype=application/pdf>{text}</File>")),
                    Err(e) => {
                        tracing::warn!(file = %file.name, error = %e, "Document extraction failed");
                        None
                    }
                }
            }
            _ => Some(format!("<File name={}/>", file.name)),
        }
    }
}

/// Media types a link is treated as an attachment for.
fn is_attachable(content_type: &str) -> bool {
    content_type.starts_with("image/")
        || content_type == "text/plain"
        || content_type == "application/pdf"
}
