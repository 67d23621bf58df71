//! Server-sent event decoding shared by the streaming backends.

use super::{ProviderError, TextStream};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::VecDeque;

/// What a backend makes of one event's `data:` payload.
#[derive(Debug, PartialEq)]
pub(crate) enum SseAction {
    Text(String),
    Skip,
    Done,
    Error(String),
}

type Extractor = Box<dyn FnMut(&str) -> SseAction + Send>;

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
    extract: Extractor,
    provider: String,
    model: String,
}

impl SseState {
    fn fail(&mut self, message: String) {
        self.pending
            .push_back(Err(ProviderError::new(&self.provider, &self.model, message)));
        self.finished = true;
    }

    fn drain_events(&mut self) {
        while let Some(pos) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.handle_event(&String::from_utf8_lossy(&raw));
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_event(&mut self, event_text: &str) {
        let Some(data) = event_data(event_text) else {
            return;
        };

        match (self.extract)(&data) {
            SseAction::Text(text) if !text.is_empty() => self.pending.push_back(Ok(text)),
            SseAction::Text(_) | SseAction::Skip => {}
            SseAction::Done => self.finished = true,
            SseAction::Error(message) => self.fail(message),
        }
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Join the `data:` lines of one event.
fn event_data(event_text: &str) -> Option<String> {
    let lines: Vec<&str> = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Turn an SSE response body into a stream of text fragments.
pub(crate) fn text_stream(
    response: reqwest::Response,
    provider: &str,
    model: &str,
    extract: impl FnMut(&str) -> SseAction + Send + 'static,
) -> TextStream {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()))
        .boxed();

    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        extract: Box::new(extract),
        provider: provider.to_string(),
        model: model.to_string(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend(chunk.into_iter().filter(|b| *b != b'\r'));
                    state.drain_events();
                }
                Some(Err(e)) => state.fail(format!("Stream read failed: {e}")),
                None => {
                    // Trailing event without the blank-line terminator
                    let rest = std::mem::take(&mut state.buffer);
                    let rest = String::from_utf8_lossy(&rest).into_owned();
                    if !rest.trim().is_empty() {
                        state.handle_event(&rest);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_data_joins_data_lines() {
        let event = "event: message\ndata: {\"a\":1}\n";
        assert_eq!(event_data(event).as_deref(), Some("{\"a\":1}"));
        assert_eq!(event_data(": keep-alive\n"), None);
        assert_eq!(event_data("data: one\ndata: two\n").as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn find_event_end_locates_blank_line() {
        assert_eq!(find_event_end(b"data: x\n\ndata: y"), Some(7));
        assert_eq!(find_event_end(b"data: x\n"), None);
    }
}
