//! Bounded delivery: every attempt runs under a timeout and a failed first
//! attempt is retried at most once after a short jittered pause.

use std::time::Duration;

use shelfmap_core::{DispatchError, Notification, NotificationDispatcher};

/// Automatic retries never exceed this, whatever the policy asks for.
pub const MAX_AUTOMATIC_RETRIES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Upper bound on a single attempt; expiry counts as a failure.
    pub attempt_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl DeliveryPolicy {
    #[must_use]
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            max_retries: MAX_AUTOMATIC_RETRIES,
            backoff_base_ms: 500,
        }
    }

    /// Single attempt, no retry. Used by the outbox worker, which schedules
    /// its own retries.
    #[must_use]
    pub fn single_attempt(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Longest [`deliver_with_retry`] can run under this policy, counting
    /// the largest jittered pause.
    #[must_use]
    pub fn budget(&self) -> Duration {
        let retries = self.max_retries.min(MAX_AUTOMATIC_RETRIES);
        let pause = Duration::from_millis(self.backoff_base_ms.saturating_mul(5) / 4);
        self.attempt_timeout
            .saturating_mul(retries + 1)
            .saturating_add(pause.saturating_mul(retries))
    }
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub attempts: u32,
    pub error: DispatchError,
}

/// Send `notification`, returning how many attempts it took.
///
/// # Errors
///
/// Returns [`DeliveryFailure`] with the last error once the attempt budget
/// (`1 + min(max_retries, 1)`) is spent.
pub async fn deliver_with_retry<D>(
    dispatcher: &D,
    notification: &Notification,
    policy: DeliveryPolicy,
) -> Result<u32, DeliveryFailure>
where
    D: NotificationDispatcher + ?Sized,
{
    let max_retries = policy.max_retries.min(MAX_AUTOMATIC_RETRIES);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match tokio::time::timeout(policy.attempt_timeout, dispatcher.send(notification))
            .await
        {
            Ok(Ok(())) => return Ok(attempt),
            Ok(Err(e)) => e,
            Err(_) => DispatchError::new(format!(
                "delivery timed out after {} ms",
                policy.attempt_timeout.as_millis()
            )),
        };

        if attempt > max_retries {
            return Err(DeliveryFailure {
                attempts: attempt,
                error,
            });
        }

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms =
            (policy.backoff_base_ms as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        tracing::warn!(
            attempt,
            delay_ms,
            to = %notification.to,
            error = %error,
            "notification delivery failed; retrying"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
