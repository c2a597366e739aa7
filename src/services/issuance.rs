use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::barcode::BarcodeGenerator;
use super::error::TicketError;
use super::notifier::NotificationSink;
use crate::models::{NewTicket, Notification};
use crate::store::{StoreError, TicketStore};

pub const DEFAULT_MAX_TICKETS_PER_USER: i64 = 10;

/// Generation attempts per barcode before giving up on the batch.
const MAX_BARCODE_ATTEMPTS: usize = 10;

/// Times a batch is regenerated after the store's unique index rejects it.
const MAX_BATCH_ATTEMPTS: usize = 3;

pub struct IssuanceService {
    store: Arc<dyn TicketStore>,
    generator: Arc<dyn BarcodeGenerator>,
    notifier: Arc<dyn NotificationSink>,
    max_per_user: i64,
}

impl IssuanceService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        generator: Arc<dyn BarcodeGenerator>,
        notifier: Arc<dyn NotificationSink>,
        max_per_user: i64,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            max_per_user,
        }
    }

    /// Issues `amount` tickets to `user_id`. Either the whole batch is
    /// persisted or none of it is.
    #[instrument(skip(self))]
    pub async fn issue(&self, user_id: Uuid, amount: u32) -> Result<u32, TicketError> {
        if amount == 0 {
            return Err(TicketError::InvalidInput(
                "Amount must be a positive number".to_string(),
            ));
        }
        let requested = i64::from(amount);
        if requested > self.max_per_user {
            return Err(TicketError::QuotaExceeded {
                max: self.max_per_user,
            });
        }

        let outstanding = self.store.count_outstanding(user_id).await?;
        if outstanding + requested > self.max_per_user {
            info!(%user_id, outstanding, amount, "Ticket quota exceeded");
            return Err(TicketError::QuotaExceeded {
                max: self.max_per_user,
            });
        }

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            let batch = self.generate_batch(user_id, amount).await?;

            match self
                .store
                .insert_batch(user_id, batch, self.max_per_user)
                .await
            {
                Ok(created) => break created,
                Err(StoreError::DuplicateBarcode) if attempt < MAX_BATCH_ATTEMPTS => {
                    warn!(%user_id, attempt, "Barcode collided on insert, regenerating batch");
                }
                Err(StoreError::DuplicateBarcode) => {
                    return Err(TicketError::BarcodeGenerationFailed);
                }
                Err(StoreError::QuotaExceeded { outstanding, .. }) => {
                    info!(%user_id, outstanding, amount, "Ticket quota exceeded at insert");
                    return Err(TicketError::QuotaExceeded {
                        max: self.max_per_user,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let count = created.len() as u32;
        info!(%user_id, count, "Tickets issued");
        self.notifier
            .emit(Notification::tickets_issued(user_id, count));

        Ok(count)
    }

    async fn generate_batch(
        &self,
        user_id: Uuid,
        amount: u32,
    ) -> Result<Vec<NewTicket>, TicketError> {
        let now = Utc::now();
        let mut seen = HashSet::with_capacity(amount as usize);
        let mut batch = Vec::with_capacity(amount as usize);

        for _ in 0..amount {
            let barcode = self.unique_barcode(&seen).await?;
            seen.insert(barcode.clone());
            batch.push(NewTicket::new(user_id, barcode, now));
        }
        Ok(batch)
    }

    async fn unique_barcode(&self, taken: &HashSet<String>) -> Result<String, TicketError> {
        for _ in 0..MAX_BARCODE_ATTEMPTS {
            let candidate = self.generator.generate();
            if taken.contains(&candidate) {
                continue;
            }
            if !self.store.barcode_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        warn!(
            attempts = MAX_BARCODE_ATTEMPTS,
            "Could not generate a unique barcode"
        );
        Err(TicketError::BarcodeGenerationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ticket, TicketStatus};
    use crate::services::barcode::RandomBarcodeGenerator;
    use crate::services::testing::RecordingSink;
    use crate::store::InMemoryTicketStore;
    use std::sync::Mutex;

    /// Returns the given codes in order, then repeats the last one.
    struct ScriptedGenerator {
        codes: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(codes: &[&str]) -> Self {
            let mut codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
            codes.reverse();
            Self {
                codes: Mutex::new(codes),
            }
        }
    }

    impl BarcodeGenerator for ScriptedGenerator {
        fn generate(&self) -> String {
            let mut codes = self.codes.lock().unwrap();
            if codes.len() > 1 {
                codes.pop().unwrap()
            } else {
                codes[0].clone()
            }
        }
    }

    fn service_with(
        store: &InMemoryTicketStore,
        generator: Arc<dyn BarcodeGenerator>,
        sink: &Arc<RecordingSink>,
    ) -> IssuanceService {
        IssuanceService::new(
            Arc::new(store.clone()),
            generator,
            sink.clone(),
            DEFAULT_MAX_TICKETS_PER_USER,
        )
    }

    fn service(store: &InMemoryTicketStore, sink: &Arc<RecordingSink>) -> IssuanceService {
        service_with(store, Arc::new(RandomBarcodeGenerator::default()), sink)
    }

    #[tokio::test]
    async fn test_issue_creates_available_tickets_with_distinct_barcodes() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let user_id = Uuid::new_v4();

        let count = service(&store, &sink).issue(user_id, 7).await.unwrap();

        assert_eq!(count, 7);
        let tickets: Vec<Ticket> = store.list_for_user(user_id).await.unwrap();
        assert_eq!(tickets.len(), 7);
        assert!(tickets.iter().all(|t| t.status == TicketStatus::Available));
        let barcodes: HashSet<&str> = tickets.iter().map(|t| t.barcode.as_str()).collect();
        assert_eq!(barcodes.len(), 7);
    }

    #[tokio::test]
    async fn test_issue_emits_single_notification() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let user_id = Uuid::new_v4();

        service(&store, &sink).issue(user_id, 3).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, crate::models::NotificationKind::TicketsIssued);
        assert_eq!(events[0].user_id, user_id);
    }

    #[tokio::test]
    async fn test_zero_amount_is_invalid() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());

        let result = service(&store, &sink).issue(Uuid::new_v4(), 0).await;

        assert!(matches!(result, Err(TicketError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_quota_exceeded_persists_nothing() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let user_id = Uuid::new_v4();
        let service = service(&store, &sink);
        service.issue(user_id, 8).await.unwrap();

        let result = service.issue(user_id, 3).await;

        assert!(matches!(result, Err(TicketError::QuotaExceeded { max: 10 })));
        assert_eq!(store.list_for_user(user_id).await.unwrap().len(), 8);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_redeemed_tickets_free_quota() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let user_id = Uuid::new_v4();
        let service = service(&store, &sink);
        service.issue(user_id, 10).await.unwrap();
        let first = store.list_for_user(user_id).await.unwrap().remove(0);
        store
            .transition_by_barcode(&first.barcode, TicketStatus::Used, Utc::now())
            .await
            .unwrap();

        assert_eq!(service.issue(user_id, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collision_triggers_regeneration() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let owner = Uuid::new_v4();
        store
            .insert_batch(owner, vec![NewTicket::new(owner, "000000000001".into(), Utc::now())], 10)
            .await
            .unwrap();
        let generator = Arc::new(ScriptedGenerator::new(&[
            "000000000001",
            "000000000002",
            "000000000002",
            "000000000003",
        ]));
        let user_id = Uuid::new_v4();

        service_with(&store, generator, &sink)
            .issue(user_id, 2)
            .await
            .unwrap();

        let mut barcodes: Vec<String> = store
            .list_for_user(user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.barcode)
            .collect();
        barcodes.sort();
        assert_eq!(barcodes, vec!["000000000002", "000000000003"]);
    }

    #[tokio::test]
    async fn test_exhausted_generation_fails_whole_batch() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let generator = Arc::new(ScriptedGenerator::new(&["111111111111"]));
        let user_id = Uuid::new_v4();

        let result = service_with(&store, generator, &sink)
            .issue(user_id, 2)
            .await;

        assert!(matches!(result, Err(TicketError::BarcodeGenerationFailed)));
        assert!(store.is_empty().await);
        assert!(sink.events().is_empty());
    }

    // Both batches pass the pre-check; the store's locked re-check lets only one through.
    #[tokio::test]
    async fn test_concurrent_issuance_respects_quota() {
        let store = InMemoryTicketStore::new();
        let sink = Arc::new(RecordingSink::default());
        let service = Arc::new(service(&store, &sink));
        let user_id = Uuid::new_v4();

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.issue(user_id, 6).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.issue(user_id, 6).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(TicketError::QuotaExceeded { .. }))));
        assert_eq!(store.count_outstanding(user_id).await.unwrap(), 6);
    }
}
