use shelfmap_core::{CoreError, RepositoryError, StoreStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The store already has the requested status. Nothing was written.
    #[error("store {store_id} is already {status}")]
    NoOpTransition {
        store_id: String,
        status: StoreStatus,
    },

    #[error("store {store_id} cannot move from {from} to {to}")]
    InvalidTransition {
        store_id: String,
        from: StoreStatus,
        to: StoreStatus,
    },

    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("store {0} not found")]
    NotFound(String),

    /// Another writer changed the store first.
    #[error("store {store_id} was modified concurrently (expected revision {expected_revision})")]
    Conflict {
        store_id: String,
        expected_revision: i64,
    },

    #[error("persistence failed: {0}")]
    Persistence(#[source] RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::RevisionConflict {
                store_id,
                expected_revision,
            } => Self::Conflict {
                store_id,
                expected_revision,
            },
            other @ RepositoryError::Unavailable(_) => Self::Persistence(other),
        }
    }
}
