use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ensure_forward, StoreError, TicketStore};
use crate::models::{NewTicket, Ticket, TicketStatus, User};

#[derive(Default)]
struct Inner {
    tickets: Vec<Ticket>,
    by_barcode: HashMap<String, usize>,
    users: HashMap<String, User>,
}

impl Inner {
    fn outstanding(&self, user_id: Uuid) -> i64 {
        self.tickets
            .iter()
            .filter(|t| t.user_id == user_id && t.is_available())
            .count() as i64
    }

    fn transition(&mut self, index: usize, to: TicketStatus, at: DateTime<Utc>) -> Option<Ticket> {
        let ticket = self.tickets.get_mut(index)?;
        if !ticket.is_available() {
            return None;
        }
        ticket.status = to;
        ticket.updated_at = at;
        if to == TicketStatus::Used {
            ticket.validated_at = Some(at);
        }
        Some(ticket.clone())
    }
}

/// Process-local store behind a single mutex. Used by tests and by servers
/// started without `DATABASE_URL`.
#[derive(Clone, Default)]
pub struct InMemoryTicketStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_user(&self, uid: impl Into<String>, username: impl Into<String>) -> User {
        let user = User {
            id: Uuid::new_v4(),
            uid: uid.into(),
            username: username.into(),
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .await
            .users
            .insert(user.uid.clone(), user.clone());
        user
    }

    /// Stores a ticket as-is, bypassing quota checks. Lets callers seed
    /// historical or already-redeemed tickets.
    pub async fn seed(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.by_barcode.contains_key(&ticket.barcode) {
            return Err(StoreError::DuplicateBarcode);
        }
        let index = inner.tickets.len();
        inner.by_barcode.insert(ticket.barcode.clone(), index);
        inner.tickets.push(ticket);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.tickets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn count_outstanding(&self, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(self.inner.lock().await.outstanding(user_id))
    }

    async fn barcode_exists(&self, barcode: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.by_barcode.contains_key(barcode))
    }

    async fn insert_batch(
        &self,
        user_id: Uuid,
        tickets: Vec<NewTicket>,
        max_outstanding: i64,
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;

        let outstanding = inner.outstanding(user_id);
        if outstanding + tickets.len() as i64 > max_outstanding {
            return Err(StoreError::QuotaExceeded {
                user_id,
                outstanding,
            });
        }

        let mut seen = std::collections::HashSet::with_capacity(tickets.len());
        for ticket in &tickets {
            if inner.by_barcode.contains_key(&ticket.barcode) || !seen.insert(&ticket.barcode) {
                return Err(StoreError::DuplicateBarcode);
            }
        }

        let mut created = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let ticket = ticket.into_ticket();
            let index = inner.tickets.len();
            inner.by_barcode.insert(ticket.barcode.clone(), index);
            inner.tickets.push(ticket.clone());
            created.push(ticket);
        }
        Ok(created)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .by_barcode
            .get(barcode)
            .and_then(|&i| inner.tickets.get(i))
            .cloned())
    }

    async fn oldest_available_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        // min_by_key keeps the first of equal keys, so ties resolve by insertion order.
        Ok(inner
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id && t.is_available())
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn transition_by_barcode(
        &self,
        barcode: &str,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        ensure_forward(to)?;
        let mut inner = self.inner.lock().await;
        let Some(&index) = inner.by_barcode.get(barcode) else {
            return Ok(None);
        };
        Ok(inner.transition(index, to, at))
    }

    async fn transition_by_id(
        &self,
        id: Uuid,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        ensure_forward(to)?;
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.tickets.iter().position(|t| t.id == id) else {
            return Ok(None);
        };
        Ok(inner.transition(index, to, at))
    }

    async fn find_user_by_uid(&self, uid: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(uid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_ticket(user_id: Uuid, barcode: &str) -> NewTicket {
        NewTicket::new(user_id, barcode.to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_insert_batch_rejects_duplicate_barcode_without_partial_write() {
        let store = InMemoryTicketStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert_batch(user_id, vec![new_ticket(user_id, "111")], 10)
            .await
            .unwrap();

        let result = store
            .insert_batch(
                user_id,
                vec![new_ticket(user_id, "222"), new_ticket(user_id, "111")],
                10,
            )
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateBarcode)));
        assert_eq!(store.len().await, 1);
        assert!(!store.barcode_exists("222").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_batch_enforces_quota() {
        let store = InMemoryTicketStore::new();
        let user_id = Uuid::new_v4();
        let batch = (0..3)
            .map(|i| new_ticket(user_id, &format!("00{}", i)))
            .collect();

        let result = store.insert_batch(user_id, batch, 2).await;

        assert!(matches!(
            result,
            Err(StoreError::QuotaExceeded { outstanding: 0, .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_transition_only_matches_available() {
        let store = InMemoryTicketStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert_batch(user_id, vec![new_ticket(user_id, "42")], 10)
            .await
            .unwrap();
        let now = Utc::now();

        let first = store
            .transition_by_barcode("42", TicketStatus::Used, now)
            .await
            .unwrap();
        let second = store
            .transition_by_barcode("42", TicketStatus::Used, now)
            .await
            .unwrap();

        let used = first.unwrap();
        assert_eq!(used.status, TicketStatus::Used);
        assert_eq!(used.validated_at, Some(now));
        assert!(second.is_none());
        assert_eq!(store.count_outstanding(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transition_back_to_available_is_rejected() {
        let store = InMemoryTicketStore::new();

        let result = store
            .transition_by_id(Uuid::new_v4(), TicketStatus::Available, Utc::now())
            .await;

        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition(TicketStatus::Available))
        ));
    }

    #[tokio::test]
    async fn test_oldest_available_skips_redeemed_tickets() {
        let store = InMemoryTicketStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let older = NewTicket::new(user_id, "1".to_string(), now - Duration::hours(2));
        let newer = NewTicket::new(user_id, "2".to_string(), now - Duration::hours(1));
        store
            .insert_batch(user_id, vec![newer, older], 10)
            .await
            .unwrap();

        let oldest = store.oldest_available_for_user(user_id).await.unwrap();
        assert_eq!(oldest.unwrap().barcode, "1");

        store
            .transition_by_barcode("1", TicketStatus::Used, now)
            .await
            .unwrap();
        let oldest = store.oldest_available_for_user(user_id).await.unwrap();
        assert_eq!(oldest.unwrap().barcode, "2");
    }
}
