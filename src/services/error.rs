use axum::http::StatusCode;
use thiserror::Error;

use crate::models::TicketStatus;
use crate::store::StoreError;

/// Failures of the ticket lifecycle and decode pipeline.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Maximum {max} tickets allowed per user")]
    QuotaExceeded { max: i64 },

    #[error("{0}")]
    NotFound(String),

    #[error("No available ticket for this user")]
    NoAvailableTicket,

    #[error("Ticket has already been used")]
    AlreadyUsed,

    #[error("Ticket is not available (status: {0})")]
    NotAvailable(TicketStatus),

    #[error("Ticket has expired")]
    Expired,

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("Decoded barcode is empty")]
    DecodeFailed,

    #[error("No valid barcode detected in the image")]
    NoBarcodeDetected,

    #[error("Failed to generate a unique barcode")]
    BarcodeGenerationFailed,

    #[error("Store error")]
    Store(#[from] StoreError),
}

impl TicketError {
    /// Error for a ticket that exists but can no longer be redeemed.
    pub fn unavailable(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Used => TicketError::AlreadyUsed,
            other => TicketError::NotAvailable(other),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TicketError::NotFound(_) | TicketError::NoAvailableTicket => StatusCode::NOT_FOUND,
            TicketError::BarcodeGenerationFailed | TicketError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TicketError::InvalidInput(_) => "INVALID_INPUT",
            TicketError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            TicketError::NotFound(_) => "NOT_FOUND",
            TicketError::NoAvailableTicket => "NO_AVAILABLE_TICKET",
            TicketError::AlreadyUsed => "ALREADY_USED",
            TicketError::NotAvailable(_) => "NOT_AVAILABLE",
            TicketError::Expired => "EXPIRED",
            TicketError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            TicketError::ImageProcessingFailed(_) => "IMAGE_PROCESSING_FAILED",
            TicketError::DecodeFailed => "DECODE_FAILED",
            TicketError::NoBarcodeDetected => "NO_BARCODE_DETECTED",
            TicketError::BarcodeGenerationFailed => "BARCODE_GENERATION_FAILED",
            TicketError::Store(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}
