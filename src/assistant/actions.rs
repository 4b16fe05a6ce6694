//! Side-effecting actions: mail and web search
//!
//! Both are traits so the assistant can run without a mail account and so
//! tests can observe what would have been sent or searched. The Gmail
//! transport lives in [`super::gmail`].

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::SearchConfig;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("mail service is not configured")]
    MailUnavailable,

    #[error("mail error: {0}")]
    Mail(String),

    #[error("mail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search failed: {0}")]
    Search(String),

    #[error("invalid search url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One message as read out to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSummary {
    pub sender: String,
    pub subject: String,
    pub content: String,
}

/// Mail account the assistant sends from and reads
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    /// Send a plain-text message
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ActionError>;

    /// Most recent `count` inbox messages, newest first
    async fn latest(&self, count: usize) -> Result<Vec<MailSummary>, ActionError>;

    /// Check if the transport is configured and ready
    fn is_configured(&self) -> bool;

    /// Get transport name
    fn name(&self) -> &'static str;
}

/// Placeholder used when no mail account is set up
pub struct UnavailableMail;

#[async_trait::async_trait]
impl MailTransport for UnavailableMail {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), ActionError> {
        Err(ActionError::MailUnavailable)
    }

    async fn latest(&self, _count: usize) -> Result<Vec<MailSummary>, ActionError> {
        Err(ActionError::MailUnavailable)
    }

    fn is_configured(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Opens a web search
#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<(), ActionError>;
}

/// Opens the search results page in the system browser
pub struct BrowserSearch {
    base_url: String,
}

impl BrowserSearch {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.base_url)
    }

    /// Results page URL for a query
    pub fn search_url(&self, query: &str) -> Result<Url, ActionError> {
        Ok(Url::parse_with_params(&self.base_url, &[("q", query)])?)
    }

    fn opener() -> &'static str {
        if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "explorer"
        } else {
            "xdg-open"
        }
    }
}

#[async_trait::async_trait]
impl WebSearch for BrowserSearch {
    async fn search(&self, query: &str) -> Result<(), ActionError> {
        let url = self.search_url(query)?;
        let program = Self::opener();
        debug!("Opening {} with {}", url, program);

        let status = tokio::process::Command::new(program)
            .arg(url.as_str())
            .status()
            .await
            .map_err(|e| ActionError::Search(format!("failed to run {}: {}", program, e)))?;

        // explorer exits non-zero even when it opened the page
        if !status.success() && !cfg!(target_os = "windows") {
            return Err(ActionError::Search(format!("{} exited with {}", program, status)));
        }

        info!("Searched for: {}", query);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_query() {
        let search = BrowserSearch::new("https://www.google.com/search");
        let url = search.search_url("rust & tokio").unwrap();
        assert_eq!(url.as_str(), "https://www.google.com/search?q=rust+%26+tokio");
    }

    #[test]
    fn test_bad_base_url() {
        let search = BrowserSearch::new("not a url");
        assert!(matches!(search.search_url("x"), Err(ActionError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_unavailable_mail() {
        let mail = UnavailableMail;
        assert!(!mail.is_configured());
        assert!(matches!(mail.send("a@b.co", "s", "b").await, Err(ActionError::MailUnavailable)));
        assert!(matches!(mail.latest(3).await, Err(ActionError::MailUnavailable)));
    }
}
