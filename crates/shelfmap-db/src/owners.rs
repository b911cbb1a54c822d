//! Database operations for the `owners` table.

use chrono::{DateTime, Utc};
use shelfmap_core::OwnerContact;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OwnerRow {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OwnerRow> for OwnerContact {
    fn from(row: OwnerRow) -> Self {
        Self {
            owner_id: row.id,
            email: row.email,
            display_name: row.display_name,
        }
    }
}

/// Insert or refresh an owner's contact details.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_owner(
    pool: &PgPool,
    id: &str,
    email: Option<&str>,
    display_name: Option<&str>,
) -> Result<OwnerRow, DbError> {
    let row = sqlx::query_as::<_, OwnerRow>(
        "INSERT INTO owners (id, email, display_name) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO UPDATE SET \
             email        = EXCLUDED.email, \
             display_name = EXCLUDED.display_name, \
             updated_at   = NOW() \
         RETURNING id, email, display_name, created_at, updated_at",
    )
    .bind(id)
    .bind(email)
    .bind(display_name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_owner(pool: &PgPool, id: &str) -> Result<Option<OwnerRow>, DbError> {
    let row = sqlx::query_as::<_, OwnerRow>(
        "SELECT id, email, display_name, created_at, updated_at FROM owners WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
