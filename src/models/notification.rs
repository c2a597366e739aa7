use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    TicketsIssued,
    TicketValidated,
    TicketUsed,
    TicketExpired,
}

/// Event pushed to the owning user after a ticket state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub user_id: Uuid,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn tickets_issued(user_id: Uuid, count: u32) -> Self {
        Self::now(
            NotificationKind::TicketsIssued,
            user_id,
            format!("You have successfully recharged {} ticket(s)", count),
        )
    }

    pub fn ticket_validated(user_id: Uuid, barcode: &str) -> Self {
        Self::now(
            NotificationKind::TicketValidated,
            user_id,
            format!("Your ticket with barcode {} has been validated", barcode),
        )
    }

    pub fn ticket_used(user_id: Uuid, barcode: &str) -> Self {
        Self::now(
            NotificationKind::TicketUsed,
            user_id,
            format!("Your ticket with barcode {} has been used", barcode),
        )
    }

    pub fn ticket_expired(user_id: Uuid, barcode: &str) -> Self {
        Self::now(
            NotificationKind::TicketExpired,
            user_id,
            format!("Your ticket with barcode {} has expired", barcode),
        )
    }

    fn now(kind: NotificationKind, user_id: Uuid, message: String) -> Self {
        Self {
            kind,
            user_id,
            message,
            timestamp: Utc::now(),
        }
    }
}
