//! Boundary contracts between the engine and its collaborators.
//!
//! Each trait has a concrete adapter elsewhere in the workspace (Postgres in
//! `shelfmap-db`, HTTP in `shelfmap-notify`) and an in-memory fake in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;
use crate::stores::{Actor, NewStore, Store, StorePatch, StoreStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store {0} not found")]
    NotFound(String),

    #[error("store {store_id} changed concurrently (expected revision {expected_revision})")]
    RevisionConflict {
        store_id: String,
        expected_revision: i64,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Outgoing message handed to a [`NotificationDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Human-readable delivery failure. Provider-specific detail is flattened
/// into `message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DispatchError {
    pub message: String,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContact {
    pub owner_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Compare-and-swap status write, optionally enqueueing a notification in
/// the same unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub store_id: String,
    pub expected_revision: i64,
    pub status: StoreStatus,
    pub actor: Actor,
    pub notification: Option<Notification>,
    /// Earliest time the outbox worker may pick up `notification`. The
    /// caller owns delivery until then.
    pub deliver_after: DateTime<Utc>,
}

/// Result of a successful [`StoreRepository::update_store_status`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub store: Store,
    /// Outbox row written alongside the status, if a notification was owed.
    pub outbox_id: Option<i64>,
}

/// A notification that is owed but not yet delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: i64,
    pub store_id: String,
    pub notification: Notification,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Insert a validated store with status `Pending` and revision 1.
    async fn create_store(&self, new_store: &NewStore) -> Result<Store, RepositoryError>;

    /// All stores, or only those with `status` when given.
    async fn fetch_stores_by_status(
        &self,
        status: Option<StoreStatus>,
    ) -> Result<Vec<Store>, RepositoryError>;

    async fn fetch_stores_by_owner(&self, owner_id: &str) -> Result<Vec<Store>, RepositoryError>;

    async fn fetch_store_by_id(&self, id: &str) -> Result<Store, RepositoryError>;

    /// Apply `change` only if the stored revision still equals
    /// `change.expected_revision`; otherwise [`RepositoryError::RevisionConflict`].
    async fn update_store_status(
        &self,
        change: &StatusChange,
    ) -> Result<StatusUpdate, RepositoryError>;

    async fn update_store_fields(
        &self,
        id: &str,
        patch: &StorePatch,
    ) -> Result<Store, RepositoryError>;

    /// Remove the store and return the record as it was.
    async fn delete_store(&self, id: &str) -> Result<Store, RepositoryError>;
}

#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    /// Take up to `limit` pending rows whose `next_attempt_at <= now`,
    /// oldest first, and move their schedule to `lease_until` so no other
    /// drain picks them up while they are being delivered.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, RepositoryError>;

    async fn mark_sent(&self, id: i64, attempts: i32) -> Result<(), RepositoryError>;

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError>;

    async fn mark_failed(&self, id: i64, attempts: i32, error: &str)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn fetch_owner_contact(
        &self,
        owner_id: &str,
    ) -> Result<Option<OwnerContact>, RepositoryError>;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Device position with its reported accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location provider timed out")]
    Timeout,
    #[error("location provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Fix, LocationError>;
}
