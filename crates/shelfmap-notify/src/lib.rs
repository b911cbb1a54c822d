//! Owner notifications: message text, the HTTP email dispatcher, and the
//! bounded single-retry delivery helper.

mod client;
pub mod error;
mod message;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use shelfmap_core::{AppConfig, DispatchError, Notification, NotificationDispatcher};

pub use client::HttpDispatcher;
pub use error::NotifyError;
pub use message::{compose_status_notification, status_subject};
pub use retry::{deliver_with_retry, DeliveryFailure, DeliveryPolicy, MAX_AUTOMATIC_RETRIES};

/// Dispatcher used when no provider is configured: logs and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDispatcher;

#[async_trait]
impl NotificationDispatcher for LogOnlyDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "notification provider not configured; message logged only"
        );
        Ok(())
    }
}

/// Pick the dispatcher for this deployment.
///
/// # Errors
///
/// Returns [`NotifyError`] if `SHELFMAP_NOTIFY_URL` is set but the client
/// cannot be built from it.
pub fn build_dispatcher(config: &AppConfig) -> Result<Arc<dyn NotificationDispatcher>, NotifyError> {
    match &config.notify_url {
        Some(url) => {
            let dispatcher = HttpDispatcher::new(
                url,
                config.notify_api_key.as_deref(),
                &config.notify_from,
                config.notify_timeout_secs,
            )?;
            Ok(Arc::new(dispatcher))
        }
        None => {
            tracing::warn!("SHELFMAP_NOTIFY_URL not set; notifications will only be logged");
            Ok(Arc::new(LogOnlyDispatcher))
        }
    }
}
