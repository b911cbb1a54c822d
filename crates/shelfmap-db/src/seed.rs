use shelfmap_core::SeedFile;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub owners: usize,
    pub stores_inserted: usize,
    /// Stores whose owner already has a store of the same name.
    pub stores_skipped: usize,
}

/// Upsert owners and insert new stores from a validated seed file.
///
/// Seeded stores start `pending` like any other registration. A store is
/// skipped when its owner already has one with the same name (case
/// insensitive), so re-running a seed is harmless. Everything runs in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_from_file(pool: &PgPool, seed: &SeedFile) -> Result<SeedReport, DbError> {
    let mut tx = pool.begin().await?;
    let mut report = SeedReport::default();

    for owner in &seed.owners {
        sqlx::query(
            "INSERT INTO owners (id, email, display_name) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = EXCLUDED.email, \
                 display_name = EXCLUDED.display_name, \
                 updated_at = NOW()",
        )
        .bind(&owner.id)
        .bind(&owner.email)
        .bind(&owner.display_name)
        .execute(&mut *tx)
        .await?;
        report.owners += 1;
    }

    for store in &seed.stores {
        let new_store = store.to_new_store();
        let inserted = sqlx::query(
            "INSERT INTO stores \
                 (public_id, owner_id, name, address, description, latitude, longitude, \
                  contact_email, permit_image_refs) \
             SELECT $1, $2, $3, $4, $5, $6::float8, $7::float8, $8, $9 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM stores WHERE owner_id = $2 AND LOWER(name) = LOWER($3) \
             )",
        )
        .bind(Uuid::new_v4())
        .bind(&new_store.owner_id)
        .bind(new_store.name.trim())
        .bind(&new_store.address)
        .bind(&new_store.description)
        .bind(new_store.location.latitude)
        .bind(new_store.location.longitude)
        .bind(&new_store.contact_email)
        .bind(&new_store.permit_image_refs)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            report.stores_skipped += 1;
        } else {
            report.stores_inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(report)
}
