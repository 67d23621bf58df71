//! Resource fetchers.
//!
//! Turn attachment references and links into plain text for the model:
//! PDF text, plain-text files, scraped web pages and video transcripts.
//! Each kind owns a namespace in the shared [`BoundedCache`]; only successful
//! results are cached.

mod cache;
mod document;
mod files;
mod web;
mod youtube;

pub use cache::BoundedCache;
pub use youtube::video_id;

use async_trait::async_trait;
use files::Downloader;
use std::sync::Arc;
use sushi_common::config::FetchersConfig;

const PDF_NAMESPACE: &str = "pdf";
const TEXT_NAMESPACE: &str = "text";
const WEB_NAMESPACE: &str = "web";
const YOUTUBE_NAMESPACE: &str = "youtube";

/// Resource fetch error.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Error downloading [{url}]: HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("Text extraction failed: {0}")]
    Extract(String),

    #[error("No transcript available for video {0}")]
    NoTranscript(String),

    #[error("Not a text page [{url}]: {content_type}")]
    NotText { url: String, content_type: String },
}

/// Text views of remote resources.
#[async_trait]
pub trait Resources: Send + Sync {
    /// Media type of a URL without parameters, lowercased.
    async fn probe_content_type(&self, url: &str) -> Option<String>;

    /// Download a plain-text file.
    async fn fetch_text_file(&self, url: &str) -> Option<String>;

    /// Download a PDF and extract its text.
    async fn extract_document_text(&self, url: &str) -> Result<String, FetchError>;

    /// Visible text of a web page.
    async fn scrape_page_text(&self, url: &str) -> Option<String>;

    /// Timestamped transcript of a video.
    async fn fetch_video_transcript(&self, url: &str) -> Option<String>;

    /// Whether a link points at a video with a fetchable transcript.
    fn is_video_link(&self, url: &str) -> bool {
        video_id(url).is_some()
    }
}

/// HTTP-backed [`Resources`] with shared caching.
pub struct WebResources {
    downloader: Downloader,
    cache: Arc<BoundedCache>,
    max_page_chars: usize,
    youtube_base: String,
}

impl WebResources {
    pub fn new(bot_token: Option<String>, config: &FetchersConfig, cache: Arc<BoundedCache>) -> Self {
        cache.set_capacity(PDF_NAMESPACE, config.pdf_cache_capacity);
        cache.set_capacity(TEXT_NAMESPACE, config.text_cache_capacity);
        cache.set_capacity(WEB_NAMESPACE, config.web_cache_capacity);
        cache.set_capacity(YOUTUBE_NAMESPACE, config.youtube_cache_capacity);

        Self {
            downloader: Downloader::new(bot_token, config.timeout_secs),
            cache,
            max_page_chars: config.max_page_chars,
            youtube_base: youtube::YOUTUBE_BASE.to_string(),
        }
    }

    /// Point transcript lookups at another host.
    pub fn with_youtube_base(mut self, base: &str) -> Self {
        self.youtube_base = base.trim_end_matches('/').to_string();
        self
    }

    fn cached(&self, namespace: &str, url: &str) -> Option<String> {
        self.cache.get(namespace, url)
    }

    async fn page_text(&self, url: &str) -> Result<String, FetchError> {
        let (body, content_type) = self.downloader.get_text(url).await?;
        let text = match content_type {
            None => web::visible_text(&body),
            Some(ct) if ct.contains("html") => web::visible_text(&body),
            Some(ct) if ct.starts_with("text/") => body.trim().to_string(),
            Some(content_type) => {
                return Err(FetchError::NotText {
                    url: url.to_string(),
                    content_type,
                })
            }
        };
        Ok(web::clip(text, self.max_page_chars))
    }
}

#[async_trait]
impl Resources for WebResources {
    async fn probe_content_type(&self, url: &str) -> Option<String> {
        match self.downloader.content_type(url).await {
            Ok(content_type) => content_type,
            Err(e) => {
                tracing::warn!(url, error = %e, "Content type probe failed");
                None
            }
        }
    }

    async fn fetch_text_file(&self, url: &str) -> Option<String> {
        if let Some(hit) = self.cached(TEXT_NAMESPACE, url) {
            return Some(hit);
        }

        match self.downloader.get_bytes(url).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.cache.set(TEXT_NAMESPACE, url, text.clone());
                Some(text)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Text file download failed");
                None
            }
        }
    }

    async fn extract_document_text(&self, url: &str) -> Result<String, FetchError> {
        if let Some(hit) = self.cached(PDF_NAMESPACE, url) {
            return Ok(hit);
        }

        let bytes = self.downloader.get_bytes(url).await?;
        let text = document::pdf_text(bytes).await?;
        self.cache.set(PDF_NAMESPACE, url, text.clone());
        Ok(text)
    }

    async fn scrape_page_text(&self, url: &str) -> Option<String> {
        if let Some(hit) = self.cached(WEB_NAMESPACE, url) {
            return Some(hit);
        }

        match self.page_text(url).await {
            Ok(text) => {
                self.cache.set(WEB_NAMESPACE, url, text.clone());
                Some(text)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to read page");
                None
            }
        }
    }

    async fn fetch_video_transcript(&self, url: &str) -> Option<String> {
        if let Some(hit) = self.cached(YOUTUBE_NAMESPACE, url) {
            return Some(hit);
        }

        let id = video_id(url)?;
        match youtube::transcript(&self.downloader, &self.youtube_base, &id).await {
            Ok(transcript) => {
                self.cache.set(YOUTUBE_NAMESPACE, url, transcript.clone());
                Some(transcript)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to extract transcript");
                None
            }
        }
    }
}
