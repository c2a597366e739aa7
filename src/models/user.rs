use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only view of a user owned by the account service. Only `uid`
/// resolution is needed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub uid: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
