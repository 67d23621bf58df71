//! Video transcripts.
//!
//! The caption track list is embedded in the watch page's player response;
//! the chosen track is fetched as timed-text XML and flattened to
//! `[start] text` segments.

use super::files::Downloader;
use super::FetchError;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

pub(crate) const YOUTUBE_BASE: &str = "https://www.youtube.com";

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"youtube\.com.*v=([^&]*)",
        r"youtu\.be/([^?/]*)",
        r"youtube\.com/embed/([^?/]*)",
        r"youtube\.com/live/([^?/]*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid video id pattern"))
    .collect()
});

static TIMED_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<text start="([0-9.]+)"[^>]*>(.*?)</text>"#).expect("valid timed text pattern")
});

const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode", default)]
    language_code: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Video id of a YouTube watch, short, embed or live URL.
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

/// Caption track URL from a watch page, preferring manual English captions.
fn caption_track_url(page: &str) -> Option<String> {
    let start = page.find(CAPTION_TRACKS_KEY)? + CAPTION_TRACKS_KEY.len();
    let tracks: Vec<CaptionTrack> = serde_json::Deserializer::from_str(&page[start..])
        .into_iter::<Vec<CaptionTrack>>()
        .next()?
        .ok()?;

    let english = |t: &&CaptionTrack| t.language_code.starts_with("en");
    let generated = |t: &&CaptionTrack| t.kind.as_deref() == Some("asr");

    tracks
        .iter()
        .find(|t| english(t) && !generated(t))
        .or_else(|| tracks.iter().find(english))
        .or_else(|| tracks.first())
        .map(|t| t.base_url.clone())
}

/// Flatten timed-text XML to `[start] text` segments.
fn render_transcript(xml: &str) -> String {
    let segments: Vec<String> = TIMED_TEXT
        .captures_iter(xml)
        .filter_map(|caps| {
            let start: f64 = caps[1].parse().ok()?;
            // captions arrive entity-encoded twice
            let once = html_escape::decode_html_entities(&caps[2]).into_owned();
            let text = html_escape::decode_html_entities(&once);
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(format!("[{start:.2}] {text}"))
        })
        .collect();

    if segments.is_empty() {
        "<empty>".to_string()
    } else {
        segments.join(" ")
    }
}

pub(crate) async fn transcript(
    downloader: &Downloader,
    base: &str,
    id: &str,
) -> Result<String, FetchError> {
    let watch_url = format!("{base}/watch?v={id}");
    let (page, _) = downloader.get_text(&watch_url).await?;

    let track_url =
        caption_track_url(&page).ok_or_else(|| FetchError::NoTranscript(id.to_string()))?;
    let (xml, _) = downloader.get_text(&track_url).await?;

    Ok(render_transcript(&xml))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_video_urls() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(video_id("https://youtu.be/dQw4w9WgXcQ?si=x").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            video_id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            video_id("https://www.youtube.com/live/dQw4w9WgXcQ?feature=share").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(video_id("https://example.com/watch?v=abc"), None);
        assert_eq!(video_id("https://www.youtube.com/@channel"), None);
    }

    #[test]
    fn prefers_manual_english_track() {
        let page = r#"var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[
            {"baseUrl":"https://www.youtube.com/api/timedtext?lang=de","name":{"runs":[{"text":"German"}]},"languageCode":"de"},
            {"baseUrl":"https://www.youtube.com/api/timedtext?lang=en&kind=asr","languageCode":"en","kind":"asr"},
            {"baseUrl":"https://www.youtube.com/api/timedtext?lang=en","languageCode":"en"}
        ],"audioTracks":[]}}};"#;

        assert_eq!(
            caption_track_url(page).as_deref(),
            Some("https://www.youtube.com/api/timedtext?lang=en")
        );
        assert_eq!(caption_track_url("<html>no captions</html>"), None);
    }

    #[test]
    fn renders_segments_with_timestamps() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
            <text start="0.5" dur="1.2">Hello &amp;amp; welcome</text>
            <text start="2" dur="3">it&amp;#39;s
            great</text></transcript>"#;

        assert_eq!(
            render_transcript(xml),
            "[0.50] Hello & welcome [2.00] it's great"
        );
        assert_eq!(render_transcript("<transcript></transcript>"), "<empty>");
    }
}
