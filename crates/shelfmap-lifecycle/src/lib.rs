//! Store review workflow: status transitions and their side effects, cached
//! store reads, and the notification outbox worker.

mod directory;
pub mod error;
pub mod keys;
mod manager;
mod outbox;
mod transitions;

pub use directory::StoreDirectory;
pub use error::LifecycleError;
pub use manager::{
    LifecycleManager, LifecyclePorts, LifecycleSettings, TransitionOutcome, TransitionWarning,
};
pub use outbox::{
    lease_until, next_attempt_at, DrainReport, OutboxSettings, OutboxWorker, CLAIM_MARGIN,
};
pub use transitions::{allowed_targets, check_transition};
