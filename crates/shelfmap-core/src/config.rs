use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can feed a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let value = or_default(var, default)
            .parse::<i64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value < 1 {
            return Err(invalid(var, format!("must be at least 1, got {value}")));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SHELFMAP_ENV", "development"))?;

    let bind_addr = or_default("SHELFMAP_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SHELFMAP_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("SHELFMAP_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SHELFMAP_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SHELFMAP_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SHELFMAP_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let cache_dir = PathBuf::from(or_default("SHELFMAP_CACHE_DIR", "./.shelfmap-cache"));
    let store_list_ttl_secs = parse_u64("SHELFMAP_STORE_LIST_TTL_SECS", "300")?;
    let profile_ttl_secs = parse_u64("SHELFMAP_PROFILE_TTL_SECS", "900")?;

    let default_max_radius_km = or_default("SHELFMAP_DEFAULT_MAX_RADIUS_KM", "50")
        .parse::<f64>()
        .map_err(|e| invalid("SHELFMAP_DEFAULT_MAX_RADIUS_KM", e.to_string()))?;
    if !default_max_radius_km.is_finite() || default_max_radius_km < 1.0 {
        return Err(invalid(
            "SHELFMAP_DEFAULT_MAX_RADIUS_KM",
            format!("must be a number >= 1, got {default_max_radius_km}"),
        ));
    }

    let notify_url = lookup("SHELFMAP_NOTIFY_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let notify_api_key = lookup("SHELFMAP_NOTIFY_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let notify_from = or_default("SHELFMAP_NOTIFY_FROM", "no-reply@shelfmap.local");
    let notify_timeout_secs = parse_u64("SHELFMAP_NOTIFY_TIMEOUT_SECS", "10")?;

    let outbox_batch_size = parse_positive_i64("SHELFMAP_OUTBOX_BATCH_SIZE", "25")?;
    let outbox_max_attempts = i32::try_from(parse_positive_i64("SHELFMAP_OUTBOX_MAX_ATTEMPTS", "5")?)
        .map_err(|e| invalid("SHELFMAP_OUTBOX_MAX_ATTEMPTS", e.to_string()))?;
    let outbox_backoff_base_secs = parse_u64("SHELFMAP_OUTBOX_BACKOFF_BASE_SECS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        cache_dir,
        store_list_ttl_secs,
        profile_ttl_secs,
        default_max_radius_km,
        notify_url,
        notify_api_key,
        notify_from,
        notify_timeout_secs,
        outbox_batch_size,
        outbox_max_attempts,
        outbox_backoff_base_secs,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SHELFMAP_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}
