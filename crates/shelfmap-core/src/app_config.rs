use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub cache_dir: PathBuf,
    pub store_list_ttl_secs: u64,
    pub profile_ttl_secs: u64,
    pub default_max_radius_km: f64,
    pub notify_url: Option<String>,
    pub notify_api_key: Option<String>,
    pub notify_from: String,
    pub notify_timeout_secs: u64,
    pub outbox_batch_size: i64,
    pub outbox_max_attempts: i32,
    pub outbox_backoff_base_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("cache_dir", &self.cache_dir)
            .field("store_list_ttl_secs", &self.store_list_ttl_secs)
            .field("profile_ttl_secs", &self.profile_ttl_secs)
            .field("default_max_radius_km", &self.default_max_radius_km)
            .field("notify_url", &self.notify_url)
            .field(
                "notify_api_key",
                &self.notify_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("notify_from", &self.notify_from)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("outbox_batch_size", &self.outbox_batch_size)
            .field("outbox_max_attempts", &self.outbox_max_attempts)
            .field("outbox_backoff_base_secs", &self.outbox_backoff_base_secs)
            .finish()
    }
}
