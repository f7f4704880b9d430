//! Discord REST client
//!
//! Thin wrapper over the handful of HTTP endpoints the relay uses. Rate
//! limited requests are retried after the delay Discord asks for.

use chat_relay_core::{BridgeError, Result};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default API root
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Maximum message length Discord accepts
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Maximum thread name length Discord accepts
const MAX_THREAD_NAME_LEN: usize = 100;

/// Thread auto-archive after 24 hours of inactivity
const AUTO_ARCHIVE_MINUTES: u32 = 1440;

/// Public thread channel type
const PUBLIC_THREAD: u8 = 11;

/// Ephemeral message flag
const EPHEMERAL: u32 = 1 << 6;

const MAX_RATE_LIMIT_RETRIES: usize = 3;

/// Interaction callback types
mod callback {
    pub const CHANNEL_MESSAGE: u8 = 4;
    pub const DEFERRED_CHANNEL_MESSAGE: u8 = 5;
}

/// Discord REST client
pub struct DiscordRest {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl DiscordRest {
    /// Create a client against the public API
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, API_BASE)
    }

    /// Create a client against a custom API root
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Replace all global commands of an application
    pub async fn register_commands(
        &self,
        application_id: &str,
        commands: &[serde_json::Value],
    ) -> Result<()> {
        let path = format!("/applications/{}/commands", application_id);
        self.request(Method::PUT, &path, Some(serde_json::json!(commands)), None)
            .await?;
        Ok(())
    }

    /// Start a public thread in a channel and return its id
    pub async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<String> {
        let path = format!("/channels/{}/threads", channel_id);
        let response = self
            .request(Method::POST, &path, Some(thread_body(name)), Some(reason))
            .await?;

        response
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Platform("Thread response has no id".into()))
    }

    /// Post a message into a channel or thread
    pub async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let path = format!("/channels/{}/messages", channel_id);
        self.request(Method::POST, &path, Some(message_body(content)), None)
            .await?;
        Ok(())
    }

    /// Acknowledge an interaction, showing a "thinking" placeholder
    pub async fn defer_interaction(
        &self,
        interaction_id: &str,
        token: &str,
        ephemeral: bool,
    ) -> Result<()> {
        let path = format!("/interactions/{}/{}/callback", interaction_id, token);
        let body = serde_json::json!({
            "type": callback::DEFERRED_CHANNEL_MESSAGE,
            "data": { "flags": if ephemeral { EPHEMERAL } else { 0 } }
        });
        self.request(Method::POST, &path, Some(body), None).await?;
        Ok(())
    }

    /// Answer an interaction immediately
    pub async fn reply_interaction(
        &self,
        interaction_id: &str,
        token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<()> {
        let path = format!("/interactions/{}/{}/callback", interaction_id, token);
        let mut data = message_body(content);
        data["flags"] = serde_json::json!(if ephemeral { EPHEMERAL } else { 0 });
        let body = serde_json::json!({ "type": callback::CHANNEL_MESSAGE, "data": data });
        self.request(Method::POST, &path, Some(body), None).await?;
        Ok(())
    }

    /// Replace the deferred placeholder of an interaction
    pub async fn edit_original_response(
        &self,
        application_id: &str,
        token: &str,
        content: &str,
    ) -> Result<()> {
        let path = format!("/webhooks/{}/{}/messages/@original", application_id, token);
        self.request(Method::PATCH, &path, Some(message_body(content)), None)
            .await?;
        Ok(())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        audit_reason: Option<&str>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(reason) = audit_reason {
                builder = builder.header("X-Audit-Log-Reason", encode_reason(reason));
            }
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            debug!("{} {}", method, path);
            let response = builder
                .send()
                .await
                .map_err(|e| BridgeError::Platform(format!("{} {} failed: {}", method, path, e)))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES {
                let retry_after = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()))
                    .unwrap_or(1.0);
                warn!("Rate limited on {}, retrying in {:.2}s", path, retry_after);
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(serde_json::Value::Null);
            }

            let text = response
                .text()
                .await
                .map_err(|e| BridgeError::Platform(format!("{} {} failed: {}", method, path, e)))?;

            if !status.is_success() {
                return Err(BridgeError::Platform(format!(
                    "{} {} returned {}: {}",
                    method, path, status, text
                )));
            }

            if text.is_empty() {
                return Ok(serde_json::Value::Null);
            }
            return serde_json::from_str(&text).map_err(Into::into);
        }

        Err(BridgeError::Platform(format!(
            "{} {} still rate limited after {} retries",
            method, path, MAX_RATE_LIMIT_RETRIES
        )))
    }
}

fn thread_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": truncate("Thread name", name, MAX_THREAD_NAME_LEN),
        "auto_archive_duration": AUTO_ARCHIVE_MINUTES,
        "type": PUBLIC_THREAD,
    })
}

fn message_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "content": truncate("Message", content, MAX_MESSAGE_LEN),
        "allowed_mentions": { "parse": [] },
    })
}

/// Cut to at most `max` characters, logging when anything is dropped
fn truncate<'a>(what: &str, text: &'a str, max: usize) -> &'a str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => {
            debug!(
                "{} truncated from {} to {} characters",
                what,
                text.chars().count(),
                max
            );
            &text[..idx]
        }
        None => text,
    }
}

/// Percent-encode an audit log reason for use as a header value
fn encode_reason(reason: &str) -> String {
    urlencoding::encode(reason).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_body() {
        let body = thread_body("example-com-38281-Runner");
        assert_eq!(body["name"], "example-com-38281-Runner");
        assert_eq!(body["auto_archive_duration"], 1440);
        assert_eq!(body["type"], 11);
    }

    #[test]
    fn test_message_body_truncated() {
        let long = "x".repeat(2500);
        let body = message_body(&long);
        assert_eq!(body["content"].as_str().unwrap().len(), MAX_MESSAGE_LEN);
        assert_eq!(body["allowed_mentions"]["parse"], serde_json::json!([]));
    }

    #[test]
    fn test_thread_name_truncated() {
        let long = "é".repeat(150);
        let body = thread_body(&long);
        assert_eq!(body["name"].as_str().unwrap().chars().count(), MAX_THREAD_NAME_LEN);
    }

    #[test]
    fn test_truncate_respects_chars() {
        assert_eq!(truncate("Test", "héllo", 2), "hé");
        assert_eq!(truncate("Test", "hi", 10), "hi");
        assert_eq!(truncate("Test", "hé", 2), "hé");
    }

    #[test]
    fn test_encode_reason() {
        assert_eq!(
            encode_reason("TreZapalooza session: a.b:1 as Rünner"),
            "TreZapalooza%20session%3A%20a.b%3A1%20as%20R%C3%BCnner"
        );
        assert_eq!(encode_reason("a~b_c-d.e"), "a~b_c-d.e");
        assert_eq!(encode_reason("50%/100"), "50%25%2F100");
    }

    #[test]
    fn test_base_url_trimmed() {
        let rest = DiscordRest::with_base_url("t", "http://localhost:9/api/");
        assert_eq!(rest.base_url, "http://localhost:9/api");
    }
}
