//! Streamed replies.
//!
//! A streamed reply starts as a "thinking" placeholder that is edited in
//! place as fragments arrive. Edits are throttled by an adaptive cadence,
//! and a segment that grows past the size limits is sealed with a
//! continuation marker while a fresh message takes over.

use crate::banner::{CONTINUED_MARKER, THINKING_PLACEHOLDER, THINKING_SUFFIX};
use crate::llm::FragmentStream;
use crate::traits::{MessageHandle, Platform};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

/// A segment is sealed once it holds more words than this.
pub const SEGMENT_MAX_WORDS: usize = 320;

/// A segment is sealed once it holds more characters than this.
pub const SEGMENT_MAX_CHARS: usize = 2400;

/// Minimum spacing between in-place edits after `elapsed` streaming time.
pub fn update_interval(elapsed: Duration) -> Duration {
    if elapsed >= Duration::from_secs(90) {
        Duration::from_millis(2500)
    } else if elapsed >= Duration::from_secs(30) {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(1)
    }
}

fn exceeds_limits(segment: &str) -> bool {
    segment.chars().count() > SEGMENT_MAX_CHARS
        || segment.split_whitespace().count() > SEGMENT_MAX_WORDS
}

/// Summary of a finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Full reply text across all segments.
    pub text: String,
    /// Number of outbound messages used.
    pub messages_posted: usize,
}

/// One reply being streamed into the platform.
pub struct StreamingReply<'a> {
    platform: &'a dyn Platform,
    channel: &'a str,
    handle: MessageHandle,
    segment: String,
    full_text: String,
    started: Instant,
    last_update: Instant,
    messages_posted: usize,
}

impl<'a> StreamingReply<'a> {
    /// Post the placeholder message.
    pub async fn start(platform: &'a dyn Platform, channel: &'a str) -> Result<Self> {
        let handle = platform
            .post_message(channel, THINKING_PLACEHOLDER)
            .await
            .context("Failed to post reply placeholder")?;
        let now = Instant::now();

        Ok(Self {
            platform,
            channel,
            handle,
            segment: String::new(),
            full_text: String::new(),
            started: now,
            last_update: now,
            messages_posted: 1,
        })
    }

    /// Append a fragment, sealing or refreshing the current message as needed.
    pub async fn push(&mut self, fragment: &str) -> Result<()> {
        self.segment.push_str(fragment);
        self.full_text.push_str(fragment);

        if exceeds_limits(&self.segment) {
            return self.seal().await;
        }

        let due = update_interval(self.started.elapsed());
        if self.last_update.elapsed() >= due {
            let text = format!("{}{THINKING_SUFFIX}", self.segment);
            self.update(&text).await;
        }
        Ok(())
    }

    /// Replace the current message with its final text.
    pub async fn finish(mut self) -> StreamSummary {
        let text = if self.segment.trim().is_empty() {
            "...".to_string()
        } else {
            std::mem::take(&mut self.segment)
        };
        self.update(&text).await;

        StreamSummary {
            text: self.full_text,
            messages_posted: self.messages_posted,
        }
    }

    /// Close the current segment and continue in a new message.
    async fn seal(&mut self) -> Result<()> {
        let sealed = format!("{}{CONTINUED_MARKER}", self.segment);
        self.update(&sealed).await;

        self.handle = self
            .platform
            .post_message(self.channel, THINKING_PLACEHOLDER)
            .await
            .context("Failed to post continuation message")?;
        self.segment.clear();
        self.messages_posted += 1;
        self.last_update = Instant::now();
        Ok(())
    }

    /// Edit the current message. Edit failures are not fatal to the reply.
    async fn update(&mut self, text: &str) {
        if let Err(e) = self
            .platform
            .update_message(self.channel, &self.handle, text)
            .await
        {
            tracing::warn!(
                platform = self.platform.name(),
                ts = %self.handle.ts,
                error = %e,
                "Failed to update streamed message"
            );
        }
        self.last_update = Instant::now();
    }
}

/// Relay a fragment stream into the channel.
///
/// A stream error stops the relay after a last edit showing the text
/// received so far, and is returned to the caller.
pub async fn relay(
    platform: &dyn Platform,
    channel: &str,
    mut fragments: FragmentStream,
) -> Result<StreamSummary> {
    let mut reply = StreamingReply::start(platform, channel).await?;

    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(fragment) => reply.push(&fragment).await?,
            Err(e) => {
                let summary = reply.finish().await;
                tracing::warn!(received = summary.text.len(), "Model stream failed midway");
                return Err(e.context("Model stream failed"));
            }
        }
    }

    Ok(reply.finish().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RawMessage;
    use crate::traits::ChannelResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Post(String),
        Update(String, String),
    }

    #[derive(Default)]
    struct RecordingPlatform {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingPlatform {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Platform for RecordingPlatform {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn fetch_history(
            &self,
            _channel: &str,
            _limit: Option<usize>,
        ) -> ChannelResult<Vec<RawMessage>> {
            Ok(Vec::new())
        }

        async fn post_message(&self, _channel: &str, text: &str) -> ChannelResult<MessageHandle> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Post(text.to_string()));
            Ok(MessageHandle {
                ts: format!("{}.0", calls.len()),
            })
        }

        async fn update_message(
            &self,
            _channel: &str,
            handle: &MessageHandle,
            text: &str,
        ) -> ChannelResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(handle.ts.clone(), text.to_string()));
            Ok(())
        }
    }

    fn fragments(parts: Vec<&str>) -> FragmentStream {
        let items: Vec<Result<String>> = parts.into_iter().map(|p| Ok(p.to_string())).collect();
        futures_util::stream::iter(items).boxed()
    }

    #[test]
    fn cadence_relaxes_over_time() {
        assert_eq!(update_interval(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(update_interval(Duration::from_secs(29)), Duration::from_secs(1));
        assert_eq!(update_interval(Duration::from_secs(30)), Duration::from_secs(2));
        assert_eq!(update_interval(Duration::from_secs(95)), Duration::from_millis(2500));
    }

    #[test]
    fn limits_count_words_and_chars() {
        assert!(!exceeds_limits(&"a".repeat(SEGMENT_MAX_CHARS)));
        assert!(exceeds_limits(&"a".repeat(SEGMENT_MAX_CHARS + 1)));
        assert!(exceeds_limits(&"w ".repeat(SEGMENT_MAX_WORDS + 1)));
        assert!(!exceeds_limits(&"w ".repeat(SEGMENT_MAX_WORDS)));
    }

    #[tokio::test(start_paused = true)]
    async fn short_stream_finishes_in_one_message() {
        let platform = RecordingPlatform::default();
        let summary = relay(&platform, "D1", fragments(vec!["Hel", "lo"])).await.unwrap();

        assert_eq!(summary.text, "Hello");
        assert_eq!(summary.messages_posted, 1);
        assert_eq!(
            platform.calls(),
            vec![
                Call::Post(THINKING_PLACEHOLDER.into()),
                Call::Update("1.0".into(), "Hello".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_segment_is_sealed_before_more_text() {
        let platform = RecordingPlatform::default();
        let long = "x".repeat(SEGMENT_MAX_CHARS + 1);
        let summary = relay(&platform, "D1", fragments(vec![&long, "tail"])).await.unwrap();

        assert_eq!(summary.messages_posted, 2);
        assert_eq!(
            platform.calls(),
            vec![
                Call::Post(THINKING_PLACEHOLDER.into()),
                Call::Update("1.0".into(), format!("{long}{CONTINUED_MARKER}")),
                Call::Post(THINKING_PLACEHOLDER.into()),
                Call::Update("3.0".into(), "tail".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_cadence_with_thinking_suffix() {
        let platform = RecordingPlatform::default();
        let slow = futures_util::stream::unfold(0u8, |n| async move {
            if n == 2 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(1100)).await;
            Some((Ok(format!("part{n} ")), n + 1))
        })
        .boxed();

        relay(&platform, "D1", slow).await.unwrap();

        let calls = platform.calls();
        assert_eq!(calls[1], Call::Update("1.0".into(), format!("part0 {THINKING_SUFFIX}")));
        assert_eq!(calls.last(), Some(&Call::Update("1.0".into(), "part0 part1 ".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_keeps_partial_text() {
        let platform = RecordingPlatform::default();
        let items: Vec<Result<String>> = vec![Ok("partial".into()), Err(anyhow::anyhow!("reset"))];
        let err = relay(&platform, "D1", futures_util::stream::iter(items).boxed())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("reset"));
        assert_eq!(
            platform.calls().last(),
            Some(&Call::Update("1.0".into(), "partial".into()))
        );
    }
}
