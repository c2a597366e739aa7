pub mod barcode;
pub mod error;
pub mod issuance;
pub mod notifier;
pub mod redemption;
#[cfg(test)]
pub(crate) mod testing;

pub use error::TicketError;
pub use issuance::IssuanceService;
pub use notifier::{NotificationHub, NotificationSink, Subscription};
pub use redemption::{ImageRedemption, RedemptionService};
