use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::decoder::{DecodeReport, ImageUpload};
use crate::models::{Ticket, TicketStatus};
use crate::services::error::TicketError;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{access_denied, created, ok};

/// Multipart field carrying the scanned barcode picture.
pub const IMAGE_FIELD: &str = "barcodeImage";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketsRequest {
    pub user_id: Option<String>,
    pub amount: Option<Amount>,
}

/// Ticket amount as sent by clients, either a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(serde_json::Number),
    Text(String),
}

impl Amount {
    fn to_count(&self) -> Option<u32> {
        let value = match self {
            Amount::Number(n) => n.as_i64()?,
            Amount::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        u32::try_from(value).ok().filter(|&v| v > 0)
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    pub barcode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyUidRequest {
    pub uid: Option<String>,
}

#[derive(Serialize)]
struct IssueTicketsResponse {
    success: bool,
    message: &'static str,
    count: u32,
}

#[derive(Serialize)]
struct ValidateTicketResponse {
    success: bool,
    message: &'static str,
    ticket: Ticket,
}

#[derive(Serialize)]
struct AccessGrantedResponse<T: Serialize> {
    success: bool,
    access: bool,
    message: &'static str,
    ticket: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<DecodeReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketSummary {
    user_id: Uuid,
    barcode: String,
    status: TicketStatus,
    validated_at: Option<DateTime<Utc>>,
}

impl From<Ticket> for TicketSummary {
    fn from(ticket: Ticket) -> Self {
        Self {
            user_id: ticket.user_id,
            barcode: ticket.barcode,
            status: ticket.status,
            validated_at: ticket.validated_at,
        }
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Ticket(TicketError::InvalidInput(message.to_string()))
}

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(invalid("User ID is required"));
    }
    Uuid::parse_str(raw).map_err(|_| invalid("User ID must be a valid UUID"))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        AppError::ValidationError("Request body must be valid JSON".to_string())
    })
}

pub async fn issue_tickets(
    State(state): State<AppState>,
    payload: Result<Json<IssueTicketsRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;

    let (Some(user_id), Some(amount)) = (request.user_id.as_deref(), request.amount.as_ref())
    else {
        return Err(invalid("User ID and amount are required"));
    };
    let user_id = parse_user_id(user_id)?;
    let amount = amount
        .to_count()
        .ok_or_else(|| invalid("Amount must be a positive number"))?;

    let count = state.issuance.issue(user_id, amount).await?;

    Ok(created(IssueTicketsResponse {
        success: true,
        message: "Tickets created successfully",
        count,
    }))
}

pub async fn list_user_tickets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let tickets = state.redemption.tickets_for_user(user_id).await?;
    Ok(ok(tickets))
}

pub async fn validate_ticket(
    State(state): State<AppState>,
    payload: Result<Json<ValidateTicketRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let barcode = request.barcode.unwrap_or_default();

    let ticket = state.redemption.redeem_by_barcode(&barcode).await?;

    Ok(ok(ValidateTicketResponse {
        success: true,
        message: "Ticket validated successfully",
        ticket,
    }))
}

/// FIFO redemption for the user in the path.
pub async fn verify_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    let result = match parse_user_id(&user_id) {
        Ok(user_id) => state
            .redemption
            .redeem_oldest_for_user(user_id)
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };
    identity_response(result)
}

/// FIFO redemption by card `uid` (JSON body) or redemption of a scanned
/// barcode image (multipart body).
pub async fn verify(State(state): State<AppState>, request: Request) -> Response {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        return match Multipart::from_request(request, &state).await {
            Ok(multipart) => verify_image(&state, multipart).await,
            Err(rejection) => access_denied(
                invalid(&rejection.body_text()),
                Some(DecodeReport::missing_file()),
            ),
        };
    }

    let payload = Json::<VerifyUidRequest>::from_request(request, &state).await;
    let result = match json_body(payload) {
        Ok(body) => state
            .redemption
            .redeem_oldest_for_uid(body.uid.as_deref().unwrap_or_default())
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };
    identity_response(result)
}

fn identity_response(result: Result<Ticket, AppError>) -> Response {
    match result {
        Ok(ticket) => ok(AccessGrantedResponse {
            success: true,
            access: true,
            message: "Access granted",
            ticket,
            debug: None,
        }),
        Err(e) => access_denied(e, None),
    }
}

async fn verify_image(state: &AppState, multipart: Multipart) -> Response {
    let upload = match read_image(multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return access_denied(
                invalid("Valid barcode image is required"),
                Some(DecodeReport::missing_file()),
            )
        }
        Err(e) => return access_denied(e, Some(DecodeReport::missing_file())),
    };

    let redemption = state.redemption.redeem_by_image(&upload).await;
    match redemption.result {
        Ok(ticket) => ok(AccessGrantedResponse {
            success: true,
            access: true,
            message: "Ticket validated successfully via image upload",
            ticket: TicketSummary::from(ticket),
            debug: Some(redemption.report),
        }),
        Err(e) => access_denied(e.into(), Some(redemption.report)),
    }
}

/// The `barcodeImage` field, or the first file field when it is absent.
async fn read_image(mut multipart: Multipart) -> Result<Option<ImageUpload>, AppError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        debug!(error = %e, "Unreadable multipart upload");
        invalid("Uploaded image is too large or malformed")
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(IMAGE_FIELD) && field.file_name().is_none() {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(malformed)?;
        return Ok(Some(ImageUpload {
            file_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}
