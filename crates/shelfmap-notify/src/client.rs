//! HTTP client for a JSON email-sending endpoint.
//!
//! The provider receives `POST <url>` with `{from, to, subject, text}` and an
//! optional bearer token. Any 2xx is success. Everything else becomes a
//! [`NotifyError`] carrying a single human-readable message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use shelfmap_core::{DispatchError, Notification, NotificationDispatcher};

use crate::error::NotifyError;

/// Longest provider error text kept in a message.
const MAX_ERROR_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Sends notifications through an HTTP email provider.
///
/// Use [`HttpDispatcher::new`] with the provider endpoint; in tests point it
/// at a wiremock server.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

impl HttpDispatcher {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`NotifyError::InvalidConfig`] if `endpoint` is not a URL.
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        from: &str,
        timeout_secs: u64,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent("shelfmap/0.1 (store-notifications)")
            .build()?;

        let endpoint = Url::parse(endpoint)
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid URL '{endpoint}': {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.map(str::to_owned),
            from: from.to_owned(),
        })
    }

    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::Http`] on network failure or timeout.
    /// - [`NotifyError::Rejected`] on a non-2xx response.
    pub async fn send_email(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = OutgoingEmail {
            from: &self.from,
            to: &notification.to,
            subject: &notification.subject,
            text: &notification.body,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message: extract_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.send_email(notification)
            .await
            .map_err(|e| DispatchError::new(e.to_string()))
    }
}

/// Pull a readable message out of a provider error body.
///
/// Understands `{"message": ..}`, `{"error": ".."}` and
/// `{"error": {"message": ..}}`; otherwise falls back to the raw text.
fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error").and_then(|e| e.get("message")))
                .or_else(|| v.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        });

    let message = from_json.unwrap_or_else(|| trimmed.to_owned());
    Some(message.chars().take(MAX_ERROR_CHARS).collect())
}
