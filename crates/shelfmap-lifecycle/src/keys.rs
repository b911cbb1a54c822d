//! Cache key conventions. Everything that reads or invalidates store data
//! goes through these so prefixes stay consistent.

use shelfmap_core::StoreStatus;

/// Prefix shared by every per-status store list.
pub const STATUS_LIST_PREFIX: &str = "stores_by_status_";

#[must_use]
pub fn store_key(store_id: &str) -> String {
    format!("store_{store_id}")
}

#[must_use]
pub fn owner_stores_key(owner_id: &str) -> String {
    format!("stores_by_owner_{owner_id}")
}

/// `None` is the unfiltered list.
#[must_use]
pub fn status_list_key(status: Option<StoreStatus>) -> String {
    match status {
        Some(status) => format!("{STATUS_LIST_PREFIX}{status}"),
        None => format!("{STATUS_LIST_PREFIX}all"),
    }
}

#[must_use]
pub fn owner_contact_key(owner_id: &str) -> String {
    format!("owner_contact_{owner_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        assert_eq!(store_key("s1"), "store_s1");
        assert_eq!(owner_stores_key("o1"), "stores_by_owner_o1");
        assert_eq!(status_list_key(Some(StoreStatus::Approved)), "stores_by_status_approved");
        assert_eq!(status_list_key(None), "stores_by_status_all");
        assert_eq!(owner_contact_key("o1"), "owner_contact_o1");
    }

    #[test]
    fn every_status_list_shares_the_prefix() {
        for status in StoreStatus::ALL.map(Some).into_iter().chain([None]) {
            assert!(status_list_key(status).starts_with(STATUS_LIST_PREFIX));
        }
    }
}
