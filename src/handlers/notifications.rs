//! WebSocket feed of ticket notifications.
//!
//! `GET /api/notifications/ws?userId=<uuid>` streams the notifications of one
//! user. Without `userId` the client receives the global fallback stream,
//! i.e. notifications whose owner had no subscriber of their own.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::notifier::Subscription;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    pub user_id: Option<Uuid>,
}

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
) -> Response {
    let receiver = match params.user_id {
        Some(user_id) => state.notifications.subscribe_user(user_id),
        None => state.notifications.subscribe_global(),
    };
    info!(user_id = ?params.user_id, "Notification subscriber connected");
    ws.on_upgrade(move |socket| forward(socket, receiver))
}

/// Runs until either side closes. Dropping `notifications` on return
/// releases the user's topic.
async fn forward(socket: WebSocket, mut notifications: Subscription) {
    let (mut sender, mut incoming) = socket.split();

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => {
                    let text = match serde_json::to_string(&notification) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Could not serialize notification");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification subscriber lagging, dropped messages");
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Notification subscriber disconnected");
}
