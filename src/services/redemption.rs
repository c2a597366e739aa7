use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::error::TicketError;
use super::notifier::NotificationSink;
use crate::decoder::{BarcodeImageDecoder, DecodeReport, ImageUpload};
use crate::models::{Notification, Ticket, TicketStatus};
use crate::store::TicketStore;

pub const DEFAULT_TICKET_TTL_HOURS: i64 = 24;

/// Candidates tried when a concurrent redemption takes the oldest ticket first.
const MAX_FIFO_ATTEMPTS: usize = 3;

/// Result of an image-based redemption. The report is returned whatever the
/// outcome.
#[derive(Debug)]
pub struct ImageRedemption {
    pub result: Result<Ticket, TicketError>,
    pub report: DecodeReport,
}

pub struct RedemptionService {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn NotificationSink>,
    decoder: Arc<BarcodeImageDecoder>,
    ticket_ttl: Duration,
}

impl RedemptionService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn NotificationSink>,
        decoder: Arc<BarcodeImageDecoder>,
        ticket_ttl: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            decoder,
            ticket_ttl,
        }
    }

    pub async fn tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, TicketError> {
        Ok(self.store.list_for_user(user_id).await?)
    }

    /// Marks the ticket carrying `barcode` as used.
    #[instrument(skip(self))]
    pub async fn redeem_by_barcode(&self, barcode: &str) -> Result<Ticket, TicketError> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(TicketError::InvalidInput(
                "Barcode string is required".to_string(),
            ));
        }

        let now = Utc::now();
        if let Some(ticket) = self
            .store
            .transition_by_barcode(barcode, TicketStatus::Used, now)
            .await?
        {
            info!(ticket_id = %ticket.id, user_id = %ticket.user_id, "Ticket validated");
            self.notifier
                .emit(Notification::ticket_validated(ticket.user_id, &ticket.barcode));
            return Ok(ticket);
        }

        match self.store.find_by_barcode(barcode).await? {
            None => Err(TicketError::NotFound(
                "Ticket not found for this barcode".to_string(),
            )),
            Some(ticket) => {
                info!(ticket_id = %ticket.id, status = %ticket.status, "Ticket rejected");
                Err(TicketError::unavailable(ticket.status))
            }
        }
    }

    /// Redeems the user's oldest available ticket, expiring it instead when it
    /// is older than the configured time-to-live.
    #[instrument(skip(self))]
    pub async fn redeem_oldest_for_user(&self, user_id: Uuid) -> Result<Ticket, TicketError> {
        for _ in 0..MAX_FIFO_ATTEMPTS {
            let Some(candidate) = self.store.oldest_available_for_user(user_id).await? else {
                return Err(TicketError::NoAvailableTicket);
            };

            let now = Utc::now();
            if now - candidate.created_at > self.ticket_ttl {
                if let Some(ticket) = self
                    .store
                    .transition_by_id(candidate.id, TicketStatus::Expired, now)
                    .await?
                {
                    info!(ticket_id = %ticket.id, %user_id, "Ticket expired on redemption");
                    self.notifier
                        .emit(Notification::ticket_expired(user_id, &ticket.barcode));
                    return Err(TicketError::Expired);
                }
                continue;
            }

            if let Some(ticket) = self
                .store
                .transition_by_id(candidate.id, TicketStatus::Used, now)
                .await?
            {
                info!(ticket_id = %ticket.id, %user_id, "Ticket used");
                self.notifier
                    .emit(Notification::ticket_used(user_id, &ticket.barcode));
                return Ok(ticket);
            }
        }

        warn!(%user_id, "Lost every FIFO redemption race");
        Err(TicketError::NoAvailableTicket)
    }

    /// Resolves a user by card `uid` and redeems their oldest ticket.
    pub async fn redeem_oldest_for_uid(&self, uid: &str) -> Result<Ticket, TicketError> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(TicketError::InvalidInput("uid is required".to_string()));
        }
        let user = self
            .store
            .find_user_by_uid(uid)
            .await?
            .ok_or_else(|| TicketError::NotFound("User not found for this uid".to_string()))?;
        self.redeem_oldest_for_user(user.id).await
    }

    /// Decodes a barcode from the uploaded image and redeems it.
    pub async fn redeem_by_image(&self, upload: &ImageUpload) -> ImageRedemption {
        let outcome = self.decoder.decode(upload).await;
        let mut report = outcome.report;

        let result = match outcome.result {
            Ok(barcode) if barcode.trim().is_empty() => Err(TicketError::DecodeFailed),
            Ok(barcode) => self.redeem_by_barcode(&barcode).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(ticket) => report.ticket_status = Some(ticket.status.to_string()),
            Err(e) => {
                report.ticket_status = match e {
                    TicketError::NotFound(_) => Some("not found".to_string()),
                    TicketError::AlreadyUsed => Some(TicketStatus::Used.to_string()),
                    TicketError::NotAvailable(status) => Some(status.to_string()),
                    _ => None,
                };
                report.error.get_or_insert_with(|| e.to_string());
            }
        }

        ImageRedemption { result, report }
    }
}
