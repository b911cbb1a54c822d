//! The only place a store's review status changes.
//!
//! A status change is sequenced as: check the transition, write the new
//! status (with an outbox row when a recipient is known) as one
//! compare-and-swap, try to deliver the notification, then invalidate every
//! cached read that could show the old status. The outbox row is written
//! leased to this call for one delivery budget, so the worker only sees it
//! once inline delivery has finished or given up. Only the write can fail the
//! operation. Delivery problems come back as [`TransitionWarning`]s.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shelfmap_cache::{Clock, LocalCache};
use shelfmap_core::{
    Actor, AppConfig, NewStore, Notification, NotificationDispatcher, NotificationOutbox,
    OwnerContact, OwnerDirectory, StatusChange, Store, StorePatch, StoreRepository, StoreStatus,
};
use shelfmap_notify::{compose_status_notification, deliver_with_retry, DeliveryPolicy};

use crate::error::LifecycleError;
use crate::keys;
use crate::outbox::{lease_until, next_attempt_at};
use crate::transitions::check_transition;

/// Soft problems reported alongside a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionWarning {
    /// Delivery failed; the message stays queued for the outbox worker.
    NotificationFailed { message: String, attempts: u32 },
    /// Neither the owner profile nor the store has a usable address.
    NoRecipient { owner_id: String },
    /// A recipient was resolved but storage did not queue the message.
    NotQueued { recipient: String },
}

impl std::fmt::Display for TransitionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotificationFailed { message, attempts } => {
                write!(f, "notification failed after {attempts} attempt(s): {message}")
            }
            Self::NoRecipient { owner_id } => {
                write!(f, "no contact address for owner {owner_id}; nobody was notified")
            }
            Self::NotQueued { recipient } => {
                write!(f, "notification to {recipient} was not queued; nobody was notified")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub store: Store,
    pub warnings: Vec<TransitionWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub profile_ttl: Duration,
    pub delivery: DeliveryPolicy,
    pub outbox_backoff_base: Duration,
}

impl LifecycleSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            profile_ttl: Duration::from_secs(config.profile_ttl_secs),
            delivery: DeliveryPolicy::new(Duration::from_secs(config.notify_timeout_secs)),
            outbox_backoff_base: Duration::from_secs(config.outbox_backoff_base_secs),
        }
    }
}

/// Collaborators the manager drives. Grouped so call sites stay readable.
#[derive(Clone)]
pub struct LifecyclePorts {
    pub stores: Arc<dyn StoreRepository>,
    pub outbox: Arc<dyn NotificationOutbox>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

pub struct LifecycleManager {
    ports: LifecyclePorts,
    cache: LocalCache,
    settings: LifecycleSettings,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(ports: LifecyclePorts, cache: LocalCache, settings: LifecycleSettings) -> Self {
        Self {
            ports,
            cache,
            settings,
        }
    }

    /// Move `store` to `new_status` on behalf of `actor`.
    ///
    /// `store` is the record the caller decided on; its `revision` guards
    /// the write, so a store changed by someone else in the meantime yields
    /// [`LifecycleError::Conflict`].
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::NoOpTransition`] if `new_status == store.status`
    ///   (checked before any I/O).
    /// - [`LifecycleError::InvalidTransition`] for edges the workflow forbids.
    /// - [`LifecycleError::Conflict`], [`LifecycleError::NotFound`] or
    ///   [`LifecycleError::Persistence`] if the write fails. Nothing is
    ///   notified or invalidated then.
    pub async fn set_status(
        &self,
        store: &Store,
        new_status: StoreStatus,
        actor: &Actor,
    ) -> Result<TransitionOutcome, LifecycleError> {
        check_transition(&store.id, store.status, new_status)?;

        let recipient = self.resolve_recipient(store).await;
        let notification = recipient
            .as_deref()
            .map(|to| compose_status_notification(&store.name, new_status, to));

        let change = StatusChange {
            store_id: store.id.clone(),
            expected_revision: store.revision,
            status: new_status,
            actor: actor.clone(),
            notification: notification.clone(),
            deliver_after: lease_until(self.ports.clock.now(), self.settings.delivery.budget()),
        };
        let update = self
            .ports
            .stores
            .update_store_status(&change)
            .await
            .map_err(|e| {
                tracing::error!(store_id = %store.id, error = %e, "status update failed");
                LifecycleError::from(e)
            })?;

        tracing::info!(
            store_id = %store.id,
            from = %store.status,
            to = %new_status,
            actor = %actor.id,
            "store status changed"
        );

        let mut warnings = Vec::new();
        match (notification, update.outbox_id) {
            (Some(notification), Some(outbox_id)) => {
                if let Some(warning) = self.deliver_now(outbox_id, &notification).await {
                    warnings.push(warning);
                }
            }
            (Some(notification), None) => {
                tracing::warn!(
                    store_id = %store.id,
                    to = %notification.to,
                    "repository did not queue the notification"
                );
                warnings.push(TransitionWarning::NotQueued {
                    recipient: notification.to,
                });
            }
            (None, _) => {
                tracing::warn!(
                    store_id = %store.id,
                    owner_id = %store.owner_id,
                    "no recipient for status notification"
                );
                warnings.push(TransitionWarning::NoRecipient {
                    owner_id: store.owner_id.clone(),
                });
            }
        }

        self.invalidate_store(&update.store).await;

        Ok(TransitionOutcome {
            store: update.store,
            warnings,
        })
    }

    /// Fetch the current record, optionally check the caller's revision,
    /// then [`set_status`](Self::set_status).
    ///
    /// # Errors
    ///
    /// As [`set_status`](Self::set_status), plus [`LifecycleError::Conflict`]
    /// when `expected_revision` is given and stale.
    pub async fn set_status_by_id(
        &self,
        store_id: &str,
        new_status: StoreStatus,
        actor: &Actor,
        expected_revision: Option<i64>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let store = self.ports.stores.fetch_store_by_id(store_id).await?;
        if let Some(expected) = expected_revision {
            if expected != store.revision {
                return Err(LifecycleError::Conflict {
                    store_id: store_id.to_string(),
                    expected_revision: expected,
                });
            }
        }
        self.set_status(&store, new_status, actor).await
    }

    /// Register a store. It always starts `Pending`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] before any I/O, or the repository's
    /// error.
    pub async fn create_store(&self, new_store: NewStore) -> Result<Store, LifecycleError> {
        let new_store = new_store.validated()?;
        let store = self.ports.stores.create_store(&new_store).await?;
        tracing::info!(store_id = %store.id, owner_id = %store.owner_id, "store registered");
        self.invalidate_store(&store).await;
        Ok(store)
    }

    /// Apply an owner edit. Status is never touched.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Validation`] before any I/O, or the repository's
    /// error.
    pub async fn edit_store(
        &self,
        store_id: &str,
        patch: StorePatch,
    ) -> Result<Store, LifecycleError> {
        let patch = patch.validated()?;
        let store = self.ports.stores.update_store_fields(store_id, &patch).await?;
        self.invalidate_store(&store).await;
        Ok(store)
    }

    /// # Errors
    ///
    /// Returns the repository's error; the cache is untouched then.
    pub async fn delete_store(&self, store_id: &str) -> Result<Store, LifecycleError> {
        let store = self.ports.stores.delete_store(store_id).await?;
        tracing::info!(store_id = %store.id, owner_id = %store.owner_id, "store deleted");
        self.invalidate_store(&store).await;
        Ok(store)
    }

    /// Owner profile email, else the store's own contact address.
    async fn resolve_recipient(&self, store: &Store) -> Option<String> {
        let key = keys::owner_contact_key(&store.owner_id);
        let owners = &self.ports.owners;
        let contact: Result<Option<OwnerContact>, _> = self
            .cache
            .get_or_fetch(&key, self.settings.profile_ttl, || {
                owners.fetch_owner_contact(&store.owner_id)
            })
            .await;

        let from_profile = match contact {
            Ok(contact) => contact.and_then(|c| c.email),
            Err(e) => {
                tracing::warn!(
                    owner_id = %store.owner_id,
                    error = %e,
                    "owner lookup failed; using store contact"
                );
                None
            }
        };

        from_profile
            .into_iter()
            .chain(store.contact_email.clone())
            .map(|email| email.trim().to_string())
            .find(|email| !email.is_empty())
    }

    async fn deliver_now(
        &self,
        outbox_id: i64,
        notification: &Notification,
    ) -> Option<TransitionWarning> {
        let outbox = &self.ports.outbox;
        let dispatcher = self.ports.dispatcher.as_ref();
        match deliver_with_retry(dispatcher, notification, self.settings.delivery).await {
            Ok(attempts) => {
                if let Err(e) = outbox.mark_sent(outbox_id, attempts_i32(attempts)).await {
                    tracing::error!(outbox_id, error = %e, "notification sent but outbox not updated");
                }
                None
            }
            Err(failure) => {
                tracing::warn!(
                    outbox_id,
                    to = %notification.to,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "notification failed; left for outbox worker"
                );
                let attempts = attempts_i32(failure.attempts);
                let retry_at = next_attempt_at(
                    self.ports.clock.now(),
                    self.settings.outbox_backoff_base,
                    attempts,
                );
                if let Err(e) = outbox
                    .mark_retry(outbox_id, attempts, retry_at, &failure.error.message)
                    .await
                {
                    tracing::error!(outbox_id, error = %e, "failed to reschedule notification");
                }
                Some(TransitionWarning::NotificationFailed {
                    message: failure.error.message,
                    attempts: failure.attempts,
                })
            }
        }
    }

    /// Drop every cached read that could include `store`.
    async fn invalidate_store(&self, store: &Store) {
        for key in [
            keys::store_key(&store.id),
            keys::owner_stores_key(&store.owner_id),
            keys::owner_contact_key(&store.owner_id),
        ] {
            if let Err(e) = self.cache.invalidate(&key).await {
                tracing::warn!(key = %key, error = %e, "cache invalidation failed");
            }
        }
        if let Err(e) = self.cache.invalidate_by_prefix(keys::STATUS_LIST_PREFIX).await {
            tracing::warn!(
                prefix = keys::STATUS_LIST_PREFIX,
                error = %e,
                "cache invalidation failed"
            );
        }
    }
}

fn attempts_i32(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}
