//! Database operations for the `stores` table.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use shelfmap_core::{Coordinate, NewStore, Store, StorePatch, StoreStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::DbError;

const STORE_COLUMNS: &str = "id, public_id, owner_id, name, address, description, latitude, \
     longitude, status, contact_email, image_ref, permit_image_refs, revision, reviewed_by, \
     reviewed_at, created_at, updated_at";

/// A row from the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRow {
    pub id: i64,
    pub public_id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    /// `NUMERIC(9,6)` in the schema.
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub status: String,
    pub contact_email: Option<String>,
    pub image_ref: Option<String>,
    pub permit_image_refs: Vec<String>,
    pub revision: i64,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreRow {
    /// Convert to the domain record. The public UUID becomes the store id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] if `status` holds an unknown value.
    pub fn into_store(self) -> Result<Store, DbError> {
        let status: StoreStatus = self.status.parse().map_err(|_| {
            DbError::InvalidRow(format!(
                "store {} has unknown status '{}'",
                self.public_id, self.status
            ))
        })?;
        Ok(Store {
            id: self.public_id.to_string(),
            name: self.name,
            address: self.address,
            description: self.description,
            location: Coordinate {
                latitude: self.latitude.to_f64().unwrap_or_default(),
                longitude: self.longitude.to_f64().unwrap_or_default(),
            },
            owner_id: self.owner_id,
            status,
            contact_email: self.contact_email,
            image_ref: self.image_ref,
            permit_image_refs: self.permit_image_refs,
            revision: self.revision,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Parse an API-facing store id. Anything that is not a UUID cannot exist.
pub(crate) fn parse_store_id(id: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(id.trim()).map_err(|_| DbError::StoreNotFound(id.to_string()))
}

/// Insert a store in `pending` status with revision 1.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_store(pool: &PgPool, new_store: &NewStore) -> Result<StoreRow, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(&format!(
        "INSERT INTO stores \
             (public_id, owner_id, name, address, description, latitude, longitude, \
              contact_email, image_ref, permit_image_refs) \
         VALUES ($1, $2, $3, $4, $5, $6::float8, $7::float8, $8, $9, $10) \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new_store.owner_id)
    .bind(&new_store.name)
    .bind(&new_store.address)
    .bind(&new_store.description)
    .bind(new_store.location.latitude)
    .bind(new_store.location.longitude)
    .bind(&new_store.contact_email)
    .bind(&new_store.image_ref)
    .bind(&new_store.permit_image_refs)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All stores, or only those in `status`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stores(
    pool: &PgPool,
    status: Option<StoreStatus>,
) -> Result<Vec<StoreRow>, DbError> {
    let rows = sqlx::query_as::<_, StoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM stores \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at, id"
    ))
    .bind(status.map(StoreStatus::as_str))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stores_by_owner(pool: &PgPool, owner_id: &str) -> Result<Vec<StoreRow>, DbError> {
    let rows = sqlx::query_as::<_, StoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM stores WHERE owner_id = $1 ORDER BY created_at, id"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_store(pool: &PgPool, public_id: Uuid) -> Result<Option<StoreRow>, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(&format!(
        "SELECT {STORE_COLUMNS} FROM stores WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Set `status` if the row is still at `expected_revision`, bumping the
/// revision and recording the reviewer.
///
/// Runs on a caller-supplied connection so it can share a transaction with
/// the outbox insert.
///
/// # Errors
///
/// - [`DbError::StoreNotFound`] if no such store exists.
/// - [`DbError::RevisionConflict`] if the revision has moved on.
/// - [`DbError::Sqlx`] if a query fails.
pub async fn update_store_status_cas(
    conn: &mut PgConnection,
    public_id: Uuid,
    expected_revision: i64,
    status: StoreStatus,
    reviewed_by: &str,
) -> Result<StoreRow, DbError> {
    let updated = sqlx::query_as::<_, StoreRow>(&format!(
        "UPDATE stores \
         SET status = $1, revision = revision + 1, reviewed_by = $2, \
             reviewed_at = NOW(), updated_at = NOW() \
         WHERE public_id = $3 AND revision = $4 \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(status.as_str())
    .bind(reviewed_by)
    .bind(public_id)
    .bind(expected_revision)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = updated {
        return Ok(row);
    }

    let exists: bool =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM stores WHERE public_id = $1)")
            .bind(public_id)
            .fetch_one(&mut *conn)
            .await?;

    Err(if exists {
        DbError::RevisionConflict {
            store_id: public_id.to_string(),
            expected_revision,
        }
    } else {
        DbError::StoreNotFound(public_id.to_string())
    })
}

/// Apply an owner edit. Absent fields are left as they are; status is
/// never touched.
///
/// # Errors
///
/// Returns [`DbError::StoreNotFound`] if no such store exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_store_fields(
    pool: &PgPool,
    public_id: Uuid,
    patch: &StorePatch,
) -> Result<StoreRow, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(&format!(
        "UPDATE stores SET \
             name              = COALESCE($2, name), \
             address           = COALESCE($3, address), \
             description       = CASE WHEN $4 THEN $5 ELSE description END, \
             latitude          = COALESCE($6::float8, latitude), \
             longitude         = COALESCE($7::float8, longitude), \
             contact_email     = CASE WHEN $8 THEN $9 ELSE contact_email END, \
             image_ref         = CASE WHEN $10 THEN $11 ELSE image_ref END, \
             permit_image_refs = COALESCE($12, permit_image_refs), \
             revision          = revision + 1, \
             updated_at        = NOW() \
         WHERE public_id = $1 \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(public_id)
    .bind(&patch.name)
    .bind(&patch.address)
    .bind(patch.description.is_some())
    .bind(patch.description.clone().flatten())
    .bind(patch.location.map(|c| c.latitude))
    .bind(patch.location.map(|c| c.longitude))
    .bind(patch.contact_email.is_some())
    .bind(patch.contact_email.clone().flatten())
    .bind(patch.image_ref.is_some())
    .bind(patch.image_ref.clone().flatten())
    .bind(&patch.permit_image_refs)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| DbError::StoreNotFound(public_id.to_string()))
}

/// Delete a store and return the row as it was.
///
/// Outbox rows are kept as delivery history.
///
/// # Errors
///
/// Returns [`DbError::StoreNotFound`] if no such store exists, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_store(pool: &PgPool, public_id: Uuid) -> Result<StoreRow, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(&format!(
        "DELETE FROM stores WHERE public_id = $1 RETURNING {STORE_COLUMNS}"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| DbError::StoreNotFound(public_id.to_string()))
}
