//! Authenticated downloads.

use super::FetchError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Hosts that serve private Slack files and need the bot token.
const SLACK_HOST_SUFFIXES: &[&str] = &["slack.com", "slack-edge.com", "slack-files.com"];

/// HTTP downloader that attaches the bot token for Slack-hosted URLs only.
pub struct Downloader {
    client: Client,
    bot_token: Option<String>,
}

fn is_slack_hosted(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| {
            SLACK_HOST_SUFFIXES
                .iter()
                .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
        })
}

/// `Text/HTML; charset=utf-8` → `text/html`
fn media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

impl Downloader {
    pub fn new(bot_token: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("sushibot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| Client::new()),
            bot_token: bot_token.filter(|t| !t.is_empty()),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match self.bot_token.as_deref() {
            Some(token) if is_slack_hosted(url) => builder.bearer_auth(token),
            _ => builder,
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.get(url).await?.bytes().await?.to_vec())
    }

    /// Body as text plus its media type.
    pub async fn get_text(&self, url: &str) -> Result<(String, Option<String>), FetchError> {
        let response = self.get(url).await?;
        let content_type = content_type_of(&response);
        Ok((response.text().await?, content_type))
    }

    /// Media type of a URL, from `HEAD` or, when the server refuses it, `GET` headers.
    pub async fn content_type(&self, url: &str) -> Result<Option<String>, FetchError> {
        let head = self.request(reqwest::Method::HEAD, url).send().await?;
        if head.status().is_success() {
            return Ok(content_type_of(&head));
        }

        tracing::debug!(url, status = head.status().as_u16(), "HEAD refused, retrying with GET");
        // headers only; the body is dropped unread
        let response = self.get(url).await?;
        Ok(content_type_of(&response))
    }
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_hosts_get_the_token() {
        assert!(is_slack_hosted("https://files.slack.com/files-pri/T1-F1/doc.pdf"));
        assert!(is_slack_hosted("https://slack.com/api/files.info"));
        assert!(!is_slack_hosted("https://notslack.com/file.pdf"));
        assert!(!is_slack_hosted("https://example.com/?next=files.slack.com"));
        assert!(!is_slack_hosted("not a url"));
    }

    #[test]
    fn media_type_drops_parameters() {
        assert_eq!(media_type("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(media_type("application/pdf"), "application/pdf");
    }
}
