//! Text of the emails sent when a store's review status changes.

use shelfmap_core::{Notification, StoreStatus};

#[must_use]
pub fn status_subject(store_name: &str, status: StoreStatus) -> String {
    match status {
        StoreStatus::Approved => format!("Your store \"{store_name}\" has been approved"),
        StoreStatus::Rejected => format!("Your store \"{store_name}\" was not approved"),
        StoreStatus::Pending => format!("Your store \"{store_name}\" is pending review"),
    }
}

fn status_body(store_name: &str, status: StoreStatus) -> String {
    let detail = match status {
        StoreStatus::Approved => {
            "It is now visible to shoppers searching for stores near them."
        }
        StoreStatus::Rejected => {
            "It will not appear in search results. Review your store details and \
             permit images, then contact support to request another review."
        }
        StoreStatus::Pending => "An administrator will review it shortly.",
    };
    format!(
        "Hello,\n\nThe review status of your store \"{store_name}\" is now {status}.\n\n\
         {detail}\n\n- The Shelfmap team\n"
    )
}

/// Build the owner notification for `store_name` moving to `status`.
#[must_use]
pub fn compose_status_notification(
    store_name: &str,
    status: StoreStatus,
    recipient: &str,
) -> Notification {
    Notification {
        to: recipient.to_string(),
        subject: status_subject(store_name, status),
        body: status_body(store_name, status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_follow_status() {
        assert_eq!(
            status_subject("Bayside Mart", StoreStatus::Approved),
            "Your store \"Bayside Mart\" has been approved"
        );
        assert_eq!(
            status_subject("Bayside Mart", StoreStatus::Rejected),
            "Your store \"Bayside Mart\" was not approved"
        );
        assert_eq!(
            status_subject("Bayside Mart", StoreStatus::Pending),
            "Your store \"Bayside Mart\" is pending review"
        );
    }

    #[test]
    fn notification_is_addressed_and_mentions_status() {
        let n = compose_status_notification("Sari-Sari", StoreStatus::Approved, "o@example.com");
        assert_eq!(n.to, "o@example.com");
        assert!(n.body.contains("\"Sari-Sari\" is now approved"));
        assert!(n.body.contains("visible to shoppers"));
    }
}
