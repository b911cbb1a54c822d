//! Lifecycle engine wired over Postgres, the on-disk cache and the
//! configured dispatcher, as the server runs it.

use std::sync::Arc;
use std::time::Duration;

use shelfmap_cache::{FileBackend, LocalCache, SystemClock};
use shelfmap_core::{AppConfig, ProximityPolicy};
use shelfmap_db::{PgOwnerDirectory, PgStoreRepository};
use shelfmap_lifecycle::{
    LifecycleManager, LifecyclePorts, LifecycleSettings, OutboxSettings, OutboxWorker,
    StoreDirectory,
};

pub(crate) struct Engine {
    pub manager: LifecycleManager,
    pub directory: StoreDirectory,
    pub worker: OutboxWorker,
}

impl Engine {
    /// Shares the server's cache directory, so CLI writes invalidate what
    /// the server would otherwise keep serving.
    pub(crate) async fn build(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<Self> {
        let backend = FileBackend::open(&config.cache_dir).await?;
        let cache = LocalCache::new(Arc::new(backend), Arc::new(SystemClock));
        let dispatcher = shelfmap_notify::build_dispatcher(config)?;
        let repo = Arc::new(PgStoreRepository::new(pool.clone()));

        let ports = LifecyclePorts {
            stores: repo.clone(),
            outbox: repo.clone(),
            owners: Arc::new(PgOwnerDirectory::new(pool)),
            dispatcher: Arc::clone(&dispatcher),
            clock: Arc::new(SystemClock),
        };
        let manager =
            LifecycleManager::new(ports, cache.clone(), LifecycleSettings::from_config(config));
        let directory = StoreDirectory::new(
            repo.clone(),
            cache,
            Duration::from_secs(config.store_list_ttl_secs),
            ProximityPolicy::with_default_max_radius(config.default_max_radius_km),
        );
        let worker = OutboxWorker::new(
            repo,
            dispatcher,
            Arc::new(SystemClock),
            OutboxSettings::from_config(config),
        );

        Ok(Self {
            manager,
            directory,
            worker,
        })
    }
}
