//! Gmail transport
//!
//! Sends dictated mail and reads the inbox through the Gmail REST API
//! (`users/me/messages`). Requests carry an OAuth bearer token; with a
//! refresh token and client credentials the transport mints its own access
//! token and renews it when Gmail answers 401.
//!
//! # Setup
//!
//! 1. Create an OAuth client in Google Cloud Console with the
//!    `gmail.send` and `gmail.readonly` scopes
//! 2. Obtain a refresh token for your account
//! 3. Set `GMAIL_REFRESH_TOKEN`, `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET`
//!    and `SENDER_EMAIL` (or the matching keys under `[mail]`)

use std::time::Duration;

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::actions::{ActionError, MailSummary, MailTransport};
use super::spoken_email::is_valid_email;
use crate::config::MailConfig;

/// Characters of a message body read out before it is cut off
const PREVIEW_CHARS: usize = 200;

/// OAuth material for the Gmail account
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GmailCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl GmailCredentials {
    /// Environment variables first, then the `[mail]` table
    pub fn from_config(config: &MailConfig) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            access_token: env("GMAIL_ACCESS_TOKEN").or_else(|| config.access_token.clone()),
            refresh_token: env("GMAIL_REFRESH_TOKEN").or_else(|| config.refresh_token.clone()),
            client_id: env("GMAIL_CLIENT_ID").or_else(|| config.client_id.clone()),
            client_secret: env("GMAIL_CLIENT_SECRET").or_else(|| config.client_secret.clone()),
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Enough to authorize a request
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() || self.can_refresh()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct GmailMessage {
    #[serde(default)]
    payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePart {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

/// Gmail API client
pub struct GmailMail {
    http: Client,
    sender: Option<String>,
    credentials: GmailCredentials,
    api_base: String,
    token_url: String,
    /// Access token currently in use
    token: Mutex<Option<String>>,
}

impl GmailMail {
    pub fn new(config: &MailConfig, credentials: GmailCredentials) -> Result<Self, ActionError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http,
            sender: config.sender_email.clone(),
            token: Mutex::new(credentials.access_token.clone()),
            credentials,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
        })
    }

    /// Build from the `[mail]` table plus `GMAIL_*` environment variables
    pub fn from_config(config: &MailConfig) -> Result<Self, ActionError> {
        Self::new(config, GmailCredentials::from_config(config))
    }

    async fn refresh_access_token(&self) -> Result<String, ActionError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            &self.credentials.refresh_token,
            &self.credentials.client_id,
            &self.credentials.client_secret,
        ) else {
            return Err(ActionError::Mail(
                "no usable access token and no refresh token configured".to_string(),
            ));
        };

        debug!("Refreshing Gmail access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(response, "token refresh").await?.json().await?;

        info!("Gmail access token refreshed");
        Ok(token.access_token)
    }

    /// Current access token, minting a new one when asked or when none is held
    async fn bearer(&self, renew: bool) -> Result<String, ActionError> {
        let mut cached = self.token.lock().await;
        if !renew {
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }
        let token = self.refresh_access_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Send an authorized request, retrying once with a fresh token on 401
    async fn execute<F>(&self, what: &str, build: F) -> Result<Response, ActionError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.bearer(false).await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.credentials.can_refresh() {
            debug!("Gmail rejected the access token, retrying {}", what);
            let token = self.bearer(true).await?;
            let retry = build(&self.http).bearer_auth(&token).send().await?;
            return check_status(retry, what).await;
        }
        check_status(response, what).await
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, ActionError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ActionError::Mail(format!("{} failed: {} - {}", what, status, body)))
}

fn single_line(value: &str) -> String {
    value.replace(|c: char| c == '\r' || c == '\n', " ")
}

/// RFC 822 plain-text message, base64url encoded for the `raw` field
pub fn encode_message(sender: &str, to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "Content-Type: text/plain; charset=\"utf-8\"\r\nMIME-Version: 1.0\r\nTo: {}\r\nFrom: {}\r\nSubject: {}\r\n\r\n{}",
        single_line(to),
        single_line(sender),
        single_line(subject),
        body
    );
    URL_SAFE.encode(message)
}

fn header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        format!("{}...", content.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        content.to_string()
    }
}

/// Sender, subject and body preview; `None` without From or Subject
fn summarize(message: &GmailMessage) -> Option<MailSummary> {
    let payload = &message.payload;
    let subject = header(payload, "Subject")?;
    let sender = header(payload, "From")?;

    // multipart mail reads its first part, like a plain-text client would
    let data = match payload.parts.first() {
        Some(part) => part.body.data.as_deref(),
        None => payload.body.data.as_deref(),
    };
    let content = data
        .and_then(decode_body)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "No content".to_string());

    Some(MailSummary {
        sender: sender.to_string(),
        subject: subject.to_string(),
        content: preview(&content),
    })
}

#[async_trait::async_trait]
impl MailTransport for GmailMail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ActionError> {
        let sender = self.sender.as_deref().ok_or(ActionError::MailUnavailable)?;
        if !is_valid_email(to) {
            return Err(ActionError::Mail(format!("invalid recipient address: {}", to)));
        }

        let url = format!("{}/messages/send", self.api_base);
        let payload = json!({ "raw": encode_message(sender, to, subject, body) });
        debug!("Sending mail from {} to {} ({})", sender, to, subject);

        self.execute("send", |http| http.post(&url).json(&payload)).await?;
        info!("Email sent to {}", to);
        Ok(())
    }

    async fn latest(&self, count: usize) -> Result<Vec<MailSummary>, ActionError> {
        let list_url = format!("{}/messages", self.api_base);
        let max_results = count.to_string();
        let listing: MessageList = self
            .execute("list messages", |http| {
                http.get(&list_url)
                    .query(&[("maxResults", max_results.as_str()), ("labelIds", "INBOX")])
            })
            .await?
            .json()
            .await?;
        debug!("Inbox listing returned {} messages", listing.messages.len());

        let mut summaries = Vec::new();
        for message in listing.messages {
            let url = format!("{}/messages/{}", self.api_base, message.id);
            let fetched = match self.execute("get message", |http| http.get(&url)).await {
                Ok(response) => response.json::<GmailMessage>().await.map_err(ActionError::from),
                Err(e) => Err(e),
            };
            match fetched {
                Ok(full) => match summarize(&full) {
                    Some(summary) => summaries.push(summary),
                    None => warn!("Skipping message {} without From/Subject", message.id),
                },
                Err(e) => warn!("Error processing message {}: {}", message.id, e),
            }
        }
        Ok(summaries)
    }

    fn is_configured(&self) -> bool {
        self.sender.is_some() && self.credentials.is_complete()
    }

    fn name(&self) -> &'static str {
        "gmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_config(sender: Option<&str>) -> MailConfig {
        MailConfig {
            sender_email: sender.map(String::from),
            ..MailConfig::default()
        }
    }

    fn with_access_token() -> GmailCredentials {
        GmailCredentials {
            access_token: Some("token".to_string()),
            ..GmailCredentials::default()
        }
    }

    fn message(value: serde_json::Value) -> GmailMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_encode_message() {
        let raw = encode_message("me@example.com", "bob@example.com", "hi\r\nBcc: x", "see you at five");
        let decoded = String::from_utf8(URL_SAFE.decode(raw).unwrap()).unwrap();
        assert!(decoded.contains("To: bob@example.com\r\n"));
        assert!(decoded.contains("From: me@example.com\r\n"));
        assert!(decoded.contains("Subject: hi  Bcc: x\r\n"));
        assert!(decoded.ends_with("\r\n\r\nsee you at five"));
    }

    #[test]
    fn test_summarize_multipart() {
        let data = URL_SAFE_NO_PAD.encode("Noon?");
        let summary = summarize(&message(json!({
            "payload": {
                "headers": [
                    {"name": "From", "value": "alice@example.com"},
                    {"name": "Subject", "value": "Lunch"}
                ],
                "parts": [{"body": {"data": data}}, {"body": {"data": "ignored"}}]
            }
        })))
        .unwrap();
        assert_eq!(
            summary,
            MailSummary {
                sender: "alice@example.com".to_string(),
                subject: "Lunch".to_string(),
                content: "Noon?".to_string(),
            }
        );
    }

    #[test]
    fn test_summarize_truncates_and_defaults() {
        let long = "a".repeat(250);
        let summary = summarize(&message(json!({
            "payload": {
                "headers": [{"name": "from", "value": "x"}, {"name": "subject", "value": "y"}],
                "body": {"data": URL_SAFE.encode(&long)}
            }
        })))
        .unwrap();
        assert_eq!(summary.content.len(), PREVIEW_CHARS + 3);
        assert!(summary.content.ends_with("..."));

        let empty = summarize(&message(json!({
            "payload": {"headers": [{"name": "From", "value": "x"}, {"name": "Subject", "value": "y"}]}
        })))
        .unwrap();
        assert_eq!(empty.content, "No content");
    }

    #[test]
    fn test_summarize_needs_headers() {
        let no_subject = message(json!({
            "payload": {"headers": [{"name": "From", "value": "x"}]}
        }));
        assert!(summarize(&no_subject).is_none());
    }

    #[test]
    fn test_is_configured() {
        let no_sender = GmailMail::new(&mail_config(None), with_access_token()).unwrap();
        assert!(!no_sender.is_configured());

        let ready = GmailMail::new(&mail_config(Some("me@example.com")), with_access_token()).unwrap();
        assert!(ready.is_configured());
        assert_eq!(ready.name(), "gmail");

        let half_refresh = GmailCredentials {
            refresh_token: Some("r".to_string()),
            ..GmailCredentials::default()
        };
        assert!(!half_refresh.is_complete());

        let full_refresh = GmailCredentials {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..half_refresh
        };
        assert!(full_refresh.can_refresh());
        let refreshing = GmailMail::new(&mail_config(Some("me@example.com")), full_refresh).unwrap();
        assert!(refreshing.is_configured());
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected() {
        let gmail = GmailMail::new(&mail_config(Some("me@example.com")), with_access_token()).unwrap();
        let result = gmail.send("bob at example", "s", "b").await;
        assert!(matches!(result, Err(ActionError::Mail(_))));
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_network() {
        let gmail = GmailMail::new(&mail_config(Some("me@example.com")), GmailCredentials::default()).unwrap();
        assert!(!gmail.is_configured());
        assert!(matches!(gmail.send("bob@example.com", "s", "b").await, Err(ActionError::Mail(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api_reports_http_error() {
        let config = MailConfig {
            api_base_url: "http://127.0.0.1:9/gmail/v1/users/me/".to_string(),
            ..mail_config(Some("me@example.com"))
        };
        let gmail = GmailMail::new(&config, with_access_token()).unwrap();
        assert!(matches!(gmail.send("bob@example.com", "s", "b").await, Err(ActionError::Http(_))));
        assert!(matches!(gmail.latest(3).await, Err(ActionError::Http(_))));
    }
}
