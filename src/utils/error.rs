use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::services::error::TicketError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Ticket(#[from] TicketError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Ticket(TicketError::Store(err))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Ticket(e) => e.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Ticket(e) => e.code(),
        }
    }

    /// Message safe to return to clients.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg) => msg.clone(),
            AppError::Ticket(TicketError::Store(_)) => "An internal error occurred".to_string(),
            AppError::Ticket(e) => e.to_string(),
        }
    }

    pub(crate) fn log(&self) {
        match self {
            AppError::Ticket(TicketError::Store(e)) => {
                error!(error = ?e, "Store error");
            }
            other if other.status_code().is_server_error() => {
                error!(error = ?other, "Application error");
            }
            other => {
                warn!(code = other.code(), message = %other.public_message(), "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        error_response(code, self.public_message(), None, status)
    }
}
