use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{health_check, notifications, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let config = state.config.clone();

    let ticket_routes = Router::new()
        .route("/", post(tickets::issue_tickets))
        .route("/user/:user_id", get(tickets::list_user_tickets))
        .route("/validate", post(tickets::validate_ticket))
        .route("/verify", post(tickets::verify))
        .route("/verify/:user_id", get(tickets::verify_user))
        .layer(DefaultBodyLimit::max(config.decoder.max_upload_bytes));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/tickets", ticket_routes)
        .route("/api/notifications/ws", get(notifications::subscribe))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(config.cors_allowed_origins.as_deref()))
}
