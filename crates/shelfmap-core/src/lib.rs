pub mod app_config;
pub mod config;
pub mod geo;
pub mod ports;
pub mod seed;
pub mod stores;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use geo::{
    distance_km, filter_by_proximity, resolve_origin, Coordinate, Locatable, Nearby,
    ProximityPolicy, ProximityQuery, ProximityResult, ViewRegion, DEFAULT_MAX_RADIUS_KM,
};
pub use ports::{
    DispatchError, Fix, GeolocationProvider, LocationError, Notification, NotificationDispatcher,
    NotificationOutbox, OutboxMessage, OwnerContact, OwnerDirectory, RepositoryError,
    StatusChange, StatusUpdate, StoreRepository,
};
pub use seed::{load_seed_stores, SeedFile, SeedOwner, SeedStore};
pub use stores::{Actor, NewStore, Store, StorePatch, StoreStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("invalid store status: {0}")]
    InvalidStatus(String),

    #[error("coordinate out of range: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

impl CoreError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read seed file {path}: {source}")]
    SeedFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed file: {0}")]
    SeedFileParse(#[from] serde_yaml::Error),

    #[error("seed validation failed: {0}")]
    Validation(String),
}
