mod cache;
mod engine;
mod outbox;
mod stores;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shelfmap-cli")]
#[command(about = "ShelfMap store directory command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// List approved stores near a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Search radius; values under 1 km use the configured default
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// List stores, optionally filtered by status
    Stores {
        /// pending, approved or rejected
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve, reject or re-review a store
    SetStatus {
        store_id: String,
        status: String,
        /// Reviewer recorded on the store
        #[arg(long)]
        actor: String,
        /// Fail unless the store is still at this revision
        #[arg(long)]
        expected_revision: Option<i64>,
    },
    /// Notification outbox maintenance
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Load owners and stores from a YAML seed file
    Seed { path: PathBuf },
    /// Local cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Debug, Subcommand)]
enum OutboxCommands {
    /// Deliver every due notification once
    Drain,
    /// Show row counts by delivery status
    Status,
}

#[derive(Debug, Subcommand)]
enum CacheCommands {
    /// Remove cached entries, all of them or those under a key prefix
    Purge {
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("shelfmap-cli: run with --help to list commands");
        return Ok(());
    };

    let config = shelfmap_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Commands::Cache {
        command: CacheCommands::Purge { prefix },
    } = &command
    {
        return cache::run_cache_purge(&config.cache_dir, prefix.as_deref()).await;
    }

    let pool_config = shelfmap_db::PoolConfig::from_app_config(&config);
    let pool = shelfmap_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = shelfmap_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Nearby {
            lat,
            lng,
            radius_km,
        } => {
            let engine = engine::Engine::build(pool, &config).await?;
            stores::run_nearby(&engine, lat, lng, radius_km).await?;
        }
        Commands::Stores { status } => {
            let engine = engine::Engine::build(pool, &config).await?;
            stores::run_stores(&engine, status.as_deref()).await?;
        }
        Commands::SetStatus {
            store_id,
            status,
            actor,
            expected_revision,
        } => {
            let engine = engine::Engine::build(pool, &config).await?;
            stores::run_set_status(&engine, &store_id, &status, &actor, expected_revision).await?;
        }
        Commands::Outbox {
            command: OutboxCommands::Drain,
        } => {
            let engine = engine::Engine::build(pool, &config).await?;
            outbox::run_outbox_drain(&engine).await?;
        }
        Commands::Outbox {
            command: OutboxCommands::Status,
        } => outbox::run_outbox_status(&pool).await?,
        Commands::Seed { path } => {
            let seed = shelfmap_core::load_seed_stores(&path)?;
            let report = shelfmap_db::seed_from_file(&pool, &seed).await?;
            println!(
                "seeded {} owner(s); {} store(s) inserted, {} already present",
                report.owners, report.stores_inserted, report.stores_skipped
            );
        }
        Commands::Cache { .. } => {}
    }

    Ok(())
}
