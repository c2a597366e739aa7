use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::decoder::DecodeReport;
use crate::utils::error::AppError;

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

/// Failure body for the verification endpoints.
#[derive(Serialize)]
pub struct AccessDeniedResponse {
    pub success: bool,
    pub access: bool,
    pub error: ApiErrorBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DecodeReport>,
}

pub fn ok<T>(body: T) -> Response
where
    T: Serialize,
{
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created<T>(body: T) -> Response
where
    T: Serialize,
{
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };

    (status, Json(body)).into_response()
}

/// Renders `err` with `access: false` and, for image uploads, the decode report.
pub fn access_denied(err: AppError, debug: Option<DecodeReport>) -> Response {
    err.log();

    let status = err.status_code();
    let body = AccessDeniedResponse {
        success: false,
        access: false,
        error: ApiErrorBody {
            code: err.code().to_string(),
            message: err.public_message(),
            details: None,
        },
        debug,
    };

    (status, Json(body)).into_response()
}
