//! Cached store reads.

use std::sync::Arc;
use std::time::Duration;

use shelfmap_cache::LocalCache;
use shelfmap_core::{
    ProximityPolicy, ProximityQuery, ProximityResult, Store, StoreRepository, StoreStatus,
};

use crate::error::LifecycleError;
use crate::keys;

/// Read-through view of the store repository.
///
/// Lists are served from the cache while younger than `ttl`. Writes made
/// through [`crate::LifecycleManager`] invalidate the affected keys.
#[derive(Clone)]
pub struct StoreDirectory {
    stores: Arc<dyn StoreRepository>,
    cache: LocalCache,
    ttl: Duration,
    policy: ProximityPolicy,
}

impl StoreDirectory {
    #[must_use]
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        cache: LocalCache,
        ttl: Duration,
        policy: ProximityPolicy,
    ) -> Self {
        Self {
            stores,
            cache,
            ttl,
            policy,
        }
    }

    /// # Errors
    ///
    /// Returns the repository's error on a cache miss that cannot be filled.
    pub async fn stores_by_owner(&self, owner_id: &str) -> Result<Vec<Store>, LifecycleError> {
        let stores = &self.stores;
        Ok(self
            .cache
            .get_or_fetch(&keys::owner_stores_key(owner_id), self.ttl, || {
                stores.fetch_stores_by_owner(owner_id)
            })
            .await?)
    }

    /// `None` lists every store regardless of status.
    ///
    /// # Errors
    ///
    /// Returns the repository's error on a cache miss that cannot be filled.
    pub async fn stores_by_status(
        &self,
        status: Option<StoreStatus>,
    ) -> Result<Vec<Store>, LifecycleError> {
        let stores = &self.stores;
        Ok(self
            .cache
            .get_or_fetch(&keys::status_list_key(status), self.ttl, || {
                stores.fetch_stores_by_status(status)
            })
            .await?)
    }

    /// One store by id.
    ///
    /// The record is cached under the id the repository returns, which is
    /// the key status changes invalidate. Other spellings of the same id
    /// always read through.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotFound`] for an unknown id, or the repository's
    /// error.
    pub async fn store(&self, store_id: &str) -> Result<Store, LifecycleError> {
        if let Some(store) = self.cache.get::<Store>(&keys::store_key(store_id), self.ttl).await {
            return Ok(store);
        }

        let store = self.stores.fetch_store_by_id(store_id).await?;
        if let Err(e) = self.cache.set(&keys::store_key(&store.id), &store).await {
            tracing::warn!(store_id = %store.id, error = %e, "cache write failed");
        }
        Ok(store)
    }

    /// Approved stores near `query.origin`, nearest first.
    ///
    /// Without a query every approved store is returned and the region
    /// falls back to a fixed zoom.
    ///
    /// # Errors
    ///
    /// Returns the repository's error on a cache miss that cannot be filled.
    pub async fn approved_nearby(
        &self,
        query: Option<&ProximityQuery>,
    ) -> Result<ProximityResult<Store>, LifecycleError> {
        let approved = self.stores_by_status(Some(StoreStatus::Approved)).await?;
        Ok(match query {
            Some(query) => query.run(&self.policy, approved),
            None => self
                .policy
                .filter(None, self.policy.default_max_radius_km, approved),
        })
    }
}
