//! Database operations for `notification_outbox`.

use chrono::{DateTime, Utc};
use shelfmap_core::{Notification, OutboxMessage};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

const OUTBOX_COLUMNS: &str = "id, store_id, recipient, subject, body, status, attempts, \
     next_attempt_at, last_error, sent_at, created_at, updated_at";

/// A row from the `notification_outbox` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub store_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// One of `pending`, `sent`, `failed`.
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id.to_string(),
            notification: Notification {
                to: row.recipient,
                subject: row.subject,
                body: row.body,
            },
            attempts: row.attempts,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
        }
    }
}

/// Per-status row counts, for operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct OutboxCounts {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
}

/// Queue a notification that the worker may pick up from `deliver_after`.
/// Call inside the transaction that wrote the status change.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_outbox_message(
    conn: &mut PgConnection,
    store_id: Uuid,
    notification: &Notification,
    deliver_after: DateTime<Utc>,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO notification_outbox (store_id, recipient, subject, body, next_attempt_at) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(store_id)
    .bind(&notification.to)
    .bind(&notification.subject)
    .bind(&notification.body)
    .bind(deliver_after)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Claim up to `limit` pending rows due at or before `now`, oldest schedule
/// first, by moving them to `lease_until`. Rows locked by a concurrent claim
/// are skipped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_due_messages(
    pool: &PgPool,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<OutboxRow>, DbError> {
    let rows = sqlx::query_as::<_, OutboxRow>(&format!(
        "WITH due AS ( \
             SELECT id FROM notification_outbox \
             WHERE status = 'pending' AND next_attempt_at <= $1 \
             ORDER BY next_attempt_at, id \
             LIMIT $3 \
             FOR UPDATE SKIP LOCKED \
         ), claimed AS ( \
             UPDATE notification_outbox o \
             SET next_attempt_at = $2, updated_at = NOW() \
             FROM due WHERE o.id = due.id \
             RETURNING o.* \
         ) \
         SELECT {OUTBOX_COLUMNS} FROM claimed ORDER BY id"
    ))
    .bind(now)
    .bind(lease_until)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_outbox_message(pool: &PgPool, id: i64) -> Result<Option<OutboxRow>, DbError> {
    let row = sqlx::query_as::<_, OutboxRow>(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM notification_outbox WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::OutboxNotPending`] if the row is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_outbox_sent(pool: &PgPool, id: i64, attempts: i32) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE notification_outbox \
         SET status = 'sent', attempts = $2, sent_at = NOW(), last_error = NULL, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(attempts)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::OutboxNotPending(id));
    }
    Ok(())
}

/// Record a failed attempt and schedule the next one.
///
/// # Errors
///
/// Returns [`DbError::OutboxNotPending`] if the row is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_outbox_retry(
    pool: &PgPool,
    id: i64,
    attempts: i32,
    next_attempt_at: DateTime<Utc>,
    error: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE notification_outbox \
         SET attempts = $2, next_attempt_at = $3, last_error = $4, updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(attempts)
    .bind(next_attempt_at)
    .bind(error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::OutboxNotPending(id));
    }
    Ok(())
}

/// Stop retrying a message.
///
/// # Errors
///
/// Returns [`DbError::OutboxNotPending`] if the row is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_outbox_failed(
    pool: &PgPool,
    id: i64,
    attempts: i32,
    error: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE notification_outbox \
         SET status = 'failed', attempts = $2, last_error = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(attempts)
    .bind(error)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::OutboxNotPending(id));
    }
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_outbox_by_status(pool: &PgPool) -> Result<OutboxCounts, DbError> {
    let counts = sqlx::query_as::<_, OutboxCounts>(
        "SELECT \
             COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
             COUNT(*) FILTER (WHERE status = 'sent')    AS sent, \
             COUNT(*) FILTER (WHERE status = 'failed')  AS failed \
         FROM notification_outbox",
    )
    .fetch_one(pool)
    .await?;

    Ok(counts)
}
