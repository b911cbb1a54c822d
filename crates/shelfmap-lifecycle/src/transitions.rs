use shelfmap_core::StoreStatus;

use crate::error::LifecycleError;

/// Statuses an admin may move a store to from `from`.
#[must_use]
pub fn allowed_targets(from: StoreStatus) -> &'static [StoreStatus] {
    match from {
        StoreStatus::Pending => &[StoreStatus::Approved, StoreStatus::Rejected],
        StoreStatus::Approved => &[StoreStatus::Rejected],
        StoreStatus::Rejected => &[StoreStatus::Approved],
    }
}

/// # Errors
///
/// [`LifecycleError::NoOpTransition`] when `from == to`, otherwise
/// [`LifecycleError::InvalidTransition`] for any edge not in
/// [`allowed_targets`].
pub fn check_transition(
    store_id: &str,
    from: StoreStatus,
    to: StoreStatus,
) -> Result<(), LifecycleError> {
    if from == to {
        return Err(LifecycleError::NoOpTransition {
            store_id: store_id.to_string(),
            status: to,
        });
    }
    if !allowed_targets(from).contains(&to) {
        return Err(LifecycleError::InvalidTransition {
            store_id: store_id.to_string(),
            from,
            to,
        });
    }
    Ok(())
}
