use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewTicket, Ticket, TicketStatus, User};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTicketStore;
pub use postgres::PgTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("barcode already exists")]
    DuplicateBarcode,

    #[error("user {user_id} already holds {outstanding} outstanding ticket(s)")]
    QuotaExceeded { user_id: Uuid, outstanding: i64 },

    #[error("invalid status transition to {0}")]
    InvalidTransition(TicketStatus),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Persistence for ticket records.
///
/// Implementations must make `insert_batch` all-or-nothing and every
/// `transition_*` a single conditional update that only matches tickets
/// still in `available`.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Number of `available` tickets held by the user.
    async fn count_outstanding(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn barcode_exists(&self, barcode: &str) -> Result<bool, StoreError>;

    /// Inserts the whole batch or nothing. The outstanding count is re-checked
    /// atomically with the insert so concurrent batches cannot overshoot
    /// `max_outstanding`.
    async fn insert_batch(
        &self,
        user_id: Uuid,
        tickets: Vec<NewTicket>,
        max_outstanding: i64,
    ) -> Result<Vec<Ticket>, StoreError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Ticket>, StoreError>;

    /// Oldest `available` ticket by `created_at`.
    async fn oldest_available_for_user(&self, user_id: Uuid)
        -> Result<Option<Ticket>, StoreError>;

    /// Returns `None` when no `available` ticket has this barcode.
    async fn transition_by_barcode(
        &self,
        barcode: &str,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Returns `None` when the ticket is gone or no longer `available`.
    async fn transition_by_id(
        &self,
        id: Uuid,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    async fn find_user_by_uid(&self, uid: &str) -> Result<Option<User>, StoreError>;
}

pub(crate) fn ensure_forward(to: TicketStatus) -> Result<(), StoreError> {
    if TicketStatus::Available.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition(to))
    }
}
