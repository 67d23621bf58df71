//! Message types.
//!
//! Two families live here: the normalized [`ChatMessage`] sent to models, and
//! the read-only [`RawMessage`] shape returned by Slack's
//! `conversations.history`, plus the [`IncomingMessage`] forwarded from the
//! Events API to the processor.

use serde::{Deserialize, Serialize};

// ============================================================================
// Normalized messages
// ============================================================================

/// Speaker of a normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged turn in the normalized history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Fold adjacent same-role messages into the earlier one, joined by `\n`.
pub fn merge_adjacent(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut merged: Vec<ChatMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => merged.push(message),
        }
    }

    merged
}

// ============================================================================
// Raw platform messages
// ============================================================================

/// One entry of the platform's message log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    pub ts: String,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub text: String,
    pub files: Vec<FileRef>,
    pub blocks: Vec<RichElement>,
}

/// Attachment descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRef {
    pub name: String,
    pub url_private: String,
    pub mimetype: String,
}

/// Node of Slack's rich-text block tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichElement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<RichElement>,
}

impl RichElement {
    fn collect_links<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.kind == "link" {
            if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
                out.push(url);
            }
        }
        for child in &self.elements {
            child.collect_links(out);
        }
    }
}

impl RawMessage {
    /// Inline link URLs in document order.
    pub fn links(&self) -> Vec<&str> {
        let mut links = Vec::new();
        for block in &self.blocks {
            block.collect_links(&mut links);
        }
        links
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.user.as_deref() == Some(user_id)
    }
}

// ============================================================================
// Incoming events
// ============================================================================

/// A direct message forwarded from the Events API to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    pub ts: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_joins_same_role_runs() {
        let merged = merge_adjacent(vec![
            ChatMessage::user("a"),
            ChatMessage::user("b"),
            ChatMessage::assistant("c"),
            ChatMessage::user("d"),
            ChatMessage::user("e"),
            ChatMessage::user("f"),
        ]);

        assert_eq!(
            merged,
            vec![
                ChatMessage::user("a\nb"),
                ChatMessage::assistant("c"),
                ChatMessage::user("d\ne\nf"),
            ]
        );
    }

    #[test]
    fn merge_of_empty_is_empty() {
        assert!(merge_adjacent(Vec::new()).is_empty());
    }

    #[test]
    fn raw_message_defaults_missing_fields() {
        let msg: RawMessage = serde_json::from_str(r#"{"ts":"1.0"}"#).unwrap();
        assert_eq!(msg.ts, "1.0");
        assert!(msg.user.is_none());
        assert!(msg.text.is_empty());
        assert!(msg.files.is_empty());
        assert!(msg.links().is_empty());
    }

    #[test]
    fn links_are_found_in_nested_blocks() {
        let json = r#"{
            "ts": "1712345678.000100",
            "user": "U1",
            "text": "see <https://a.example> and <https://b.example>",
            "blocks": [{
                "type": "rich_text",
                "elements": [{
                    "type": "rich_text_section",
                    "elements": [
                        {"type": "text", "text": "see "},
                        {"type": "link", "url": "https://a.example"},
                        {"type": "text", "text": " and "},
                        {"type": "link", "url": "https://b.example"}
                    ]
                }]
            }]
        }"#;

        let msg: RawMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_from("U1"));
        assert_eq!(msg.links(), vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
