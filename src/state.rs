use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::decoder::BarcodeImageDecoder;
use crate::services::barcode::RandomBarcodeGenerator;
use crate::services::issuance::IssuanceService;
use crate::services::notifier::NotificationHub;
use crate::services::redemption::RedemptionService;
use crate::store::TicketStore;

#[derive(Clone)]
pub struct AppState {
    pub issuance: Arc<IssuanceService>,
    pub redemption: Arc<RedemptionService>,
    pub notifications: NotificationHub,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services around `store`, sharing one notification hub.
    pub fn new(
        config: Config,
        store: Arc<dyn TicketStore>,
        decoder: BarcodeImageDecoder,
    ) -> Self {
        let notifications = NotificationHub::new();
        let sink = Arc::new(notifications.clone());

        let issuance = IssuanceService::new(
            store.clone(),
            Arc::new(RandomBarcodeGenerator::new(config.tickets.barcode_length)),
            sink.clone(),
            config.tickets.max_per_user,
        );
        let redemption = RedemptionService::new(
            store,
            sink,
            Arc::new(decoder),
            Duration::hours(config.tickets.ttl_hours),
        );

        Self {
            issuance: Arc::new(issuance),
            redemption: Arc::new(redemption),
            notifications,
            config: Arc::new(config),
        }
    }
}
