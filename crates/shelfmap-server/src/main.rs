mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use shelfmap_cache::{FileBackend, LocalCache, SystemClock};
use shelfmap_core::Environment;
use shelfmap_db::PgStoreRepository;
use shelfmap_lifecycle::{OutboxSettings, OutboxWorker};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::{AdminAuthState, AuthState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(shelfmap_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = shelfmap_db::PoolConfig::from_app_config(&config);
    let pool = shelfmap_db::connect_pool(&config.database_url, pool_config).await?;
    shelfmap_db::run_migrations(&pool).await?;

    let backend = FileBackend::open(&config.cache_dir).await?;
    let cache = LocalCache::new(Arc::new(backend), Arc::new(SystemClock));
    let dispatcher = shelfmap_notify::build_dispatcher(&config)?;

    let worker = Arc::new(OutboxWorker::new(
        Arc::new(PgStoreRepository::new(pool.clone())),
        Arc::clone(&dispatcher),
        Arc::new(SystemClock),
        OutboxSettings::from_config(&config),
    ));
    let _scheduler = scheduler::build_scheduler(worker).await?;

    let is_development = matches!(config.env, Environment::Development);
    let auth = AuthState::from_env(is_development)?;
    let admin = AdminAuthState::from_env(is_development)?;
    let state = AppState::new(pool, cache, dispatcher, &config);
    let app = build_app(state, auth, admin, default_rate_limit_state());

    tracing::info!(bind_addr = %config.bind_addr, env = %config.env, "shelfmap server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
