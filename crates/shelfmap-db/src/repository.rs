//! Postgres adapters for the engine's storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelfmap_core::{
    NewStore, NotificationOutbox, OutboxMessage, OwnerContact, OwnerDirectory, RepositoryError,
    StatusChange, StatusUpdate, Store, StorePatch, StoreRepository, StoreStatus,
};
use sqlx::PgPool;

use crate::stores::{parse_store_id, StoreRow};
use crate::{outbox, owners, stores, DbError};

/// Stores and their notification outbox, which share a transaction on
/// status changes.
#[derive(Debug, Clone)]
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_status_change(&self, change: &StatusChange) -> Result<StatusUpdate, DbError> {
        let public_id = parse_store_id(&change.store_id)?;
        let mut tx = self.pool.begin().await?;

        let row = stores::update_store_status_cas(
            &mut *tx,
            public_id,
            change.expected_revision,
            change.status,
            &change.actor.id,
        )
        .await?;

        let outbox_id = match &change.notification {
            Some(notification) => {
                Some(
                    outbox::insert_outbox_message(
                        &mut *tx,
                        public_id,
                        notification,
                        change.deliver_after,
                    )
                    .await?,
                )
            }
            None => None,
        };

        tx.commit().await?;

        Ok(StatusUpdate {
            store: row.into_store()?,
            outbox_id,
        })
    }
}

fn into_stores(rows: Vec<StoreRow>) -> Result<Vec<Store>, DbError> {
    rows.into_iter().map(StoreRow::into_store).collect()
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn create_store(&self, new_store: &NewStore) -> Result<Store, RepositoryError> {
        let row = stores::insert_store(&self.pool, new_store).await?;
        Ok(row.into_store()?)
    }

    async fn fetch_stores_by_status(
        &self,
        status: Option<StoreStatus>,
    ) -> Result<Vec<Store>, RepositoryError> {
        Ok(into_stores(stores::list_stores(&self.pool, status).await?)?)
    }

    async fn fetch_stores_by_owner(&self, owner_id: &str) -> Result<Vec<Store>, RepositoryError> {
        Ok(into_stores(
            stores::list_stores_by_owner(&self.pool, owner_id).await?,
        )?)
    }

    async fn fetch_store_by_id(&self, id: &str) -> Result<Store, RepositoryError> {
        let public_id = parse_store_id(id)?;
        let row = stores::get_store(&self.pool, public_id)
            .await?
            .ok_or_else(|| DbError::StoreNotFound(id.to_string()))?;
        Ok(row.into_store()?)
    }

    async fn update_store_status(
        &self,
        change: &StatusChange,
    ) -> Result<StatusUpdate, RepositoryError> {
        Ok(self.apply_status_change(change).await?)
    }

    async fn update_store_fields(
        &self,
        id: &str,
        patch: &StorePatch,
    ) -> Result<Store, RepositoryError> {
        let public_id = parse_store_id(id)?;
        let row = stores::update_store_fields(&self.pool, public_id, patch).await?;
        Ok(row.into_store()?)
    }

    async fn delete_store(&self, id: &str) -> Result<Store, RepositoryError> {
        let public_id = parse_store_id(id)?;
        let row = stores::delete_store(&self.pool, public_id).await?;
        Ok(row.into_store()?)
    }
}

#[async_trait]
impl NotificationOutbox for PgStoreRepository {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, RepositoryError> {
        let rows = outbox::claim_due_messages(&self.pool, now, lease_until, limit).await?;
        Ok(rows.into_iter().map(OutboxMessage::from).collect())
    }

    async fn mark_sent(&self, id: i64, attempts: i32) -> Result<(), RepositoryError> {
        Ok(outbox::mark_outbox_sent(&self.pool, id, attempts).await?)
    }

    async fn mark_retry(
        &self,
        id: i64,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), RepositoryError> {
        Ok(outbox::mark_outbox_retry(&self.pool, id, attempts, next_attempt_at, error).await?)
    }

    async fn mark_failed(
        &self,
        id: i64,
        attempts: i32,
        error: &str,
    ) -> Result<(), RepositoryError> {
        Ok(outbox::mark_outbox_failed(&self.pool, id, attempts, error).await?)
    }
}

#[derive(Debug, Clone)]
pub struct PgOwnerDirectory {
    pool: PgPool,
}

impl PgOwnerDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerDirectory for PgOwnerDirectory {
    async fn fetch_owner_contact(
        &self,
        owner_id: &str,
    ) -> Result<Option<OwnerContact>, RepositoryError> {
        let row = owners::get_owner(&self.pool, owner_id).await?;
        Ok(row.map(OwnerContact::from))
    }
}
