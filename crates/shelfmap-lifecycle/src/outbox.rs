//! Background delivery of notifications owed by past status changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shelfmap_cache::Clock;
use shelfmap_core::{AppConfig, NotificationDispatcher, NotificationOutbox, OutboxMessage};
use shelfmap_notify::{deliver_with_retry, DeliveryPolicy};

use crate::error::LifecycleError;

/// Exponent cap for [`next_attempt_at`].
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Slack added to a delivery budget before a claimed message may be taken
/// again, covering the write that records its outcome.
pub const CLAIM_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxSettings {
    pub batch_size: i64,
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl OutboxSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.outbox_batch_size,
            max_attempts: config.outbox_max_attempts,
            backoff_base: Duration::from_secs(config.outbox_backoff_base_secs),
            attempt_timeout: Duration::from_secs(config.notify_timeout_secs),
        }
    }
}

/// When a message that has failed `attempts` times should be tried again:
/// `now + base * 2^attempts`.
#[must_use]
pub fn next_attempt_at(now: DateTime<Utc>, base: Duration, attempts: i32) -> DateTime<Utc> {
    let exponent = u32::try_from(attempts.max(0))
        .unwrap_or(0)
        .min(MAX_BACKOFF_EXPONENT);
    let delay = base.saturating_mul(1u32 << exponent);
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// End of the window in which whoever is delivering a message owns it.
#[must_use]
pub fn lease_until(now: DateTime<Utc>, budget: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(budget.saturating_add(CLAIM_MARGIN))
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct OutboxWorker {
    outbox: Arc<dyn NotificationOutbox>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    settings: OutboxSettings,
}

impl OutboxWorker {
    #[must_use]
    pub fn new(
        outbox: Arc<dyn NotificationOutbox>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        settings: OutboxSettings,
    ) -> Self {
        Self {
            outbox,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Claim due messages and try each once.
    ///
    /// Claimed messages are leased for one delivery budget, so an
    /// overlapping drain skips them.
    ///
    /// A failed delivery is rescheduled with exponential backoff, or marked
    /// failed once it reaches `max_attempts`. Errors recording a single
    /// message's outcome are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Persistence`] if due messages cannot be listed.
    pub async fn drain_outbox(&self) -> Result<DrainReport, LifecycleError> {
        let now = self.clock.now();
        let lease = lease_until(now, self.policy().budget());
        let due = self
            .outbox
            .claim_due(now, lease, self.settings.batch_size)
            .await
            .map_err(LifecycleError::Persistence)?;

        let mut report = DrainReport::default();
        for message in due {
            self.process(&message, &mut report).await;
        }

        if report != DrainReport::default() {
            tracing::info!(
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "outbox drained"
            );
        }
        Ok(report)
    }

    fn policy(&self) -> DeliveryPolicy {
        DeliveryPolicy::single_attempt(self.settings.attempt_timeout)
    }

    async fn process(&self, message: &OutboxMessage, report: &mut DrainReport) {
        let attempts = message.attempts.saturating_add(1);

        let recorded = match deliver_with_retry(
            self.dispatcher.as_ref(),
            &message.notification,
            self.policy(),
        )
        .await
        {
            Ok(_) => {
                report.sent += 1;
                self.outbox.mark_sent(message.id, attempts).await
            }
            Err(failure) if attempts >= self.settings.max_attempts => {
                tracing::warn!(
                    outbox_id = message.id,
                    store_id = %message.store_id,
                    attempts,
                    error = %failure.error,
                    "giving up on notification"
                );
                report.failed += 1;
                self.outbox
                    .mark_failed(message.id, attempts, &failure.error.message)
                    .await
            }
            Err(failure) => {
                let retry_at =
                    next_attempt_at(self.clock.now(), self.settings.backoff_base, attempts);
                tracing::debug!(
                    outbox_id = message.id,
                    attempts,
                    %retry_at,
                    error = %failure.error,
                    "notification rescheduled"
                );
                report.retried += 1;
                self.outbox
                    .mark_retry(message.id, attempts, retry_at, &failure.error.message)
                    .await
            }
        };

        if let Err(e) = recorded {
            tracing::error!(outbox_id = message.id, error = %e, "failed to record outbox outcome");
        }
    }
}
