use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef, Postgres};
use sqlx::{Decode, Encode, FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Available,
    Used,
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Available => "available",
            TicketStatus::Used => "used",
            TicketStatus::Expired => "expired",
        }
    }

    /// Statuses only move forward out of `available`.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Available, TicketStatus::Used)
                | (TicketStatus::Available, TicketStatus::Expired)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TicketStatus::Available),
            "used" => Ok(TicketStatus::Used),
            "expired" => Ok(TicketStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// Stored as plain TEXT guarded by a CHECK constraint.
impl Type<Postgres> for TicketStatus {
    fn type_info() -> PgTypeInfo {
        <&str as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as Type<Postgres>>::compatible(ty)
    }
}

impl Encode<'_, Postgres> for TicketStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for TicketStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as Decode<Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub barcode: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_available(&self) -> bool {
        self.status == TicketStatus::Available
    }
}

/// A ticket about to be persisted by the issuance service.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub barcode: String,
    pub created_at: DateTime<Utc>,
}

impl NewTicket {
    pub fn new(user_id: Uuid, barcode: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            barcode,
            created_at,
        }
    }

    pub fn into_ticket(self) -> Ticket {
        Ticket {
            id: self.id,
            user_id: self.user_id,
            barcode: self.barcode,
            status: TicketStatus::Available,
            created_at: self.created_at,
            validated_at: None,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_one_directional() {
        assert!(TicketStatus::Available.can_transition_to(TicketStatus::Used));
        assert!(TicketStatus::Available.can_transition_to(TicketStatus::Expired));
        assert!(!TicketStatus::Used.can_transition_to(TicketStatus::Available));
        assert!(!TicketStatus::Expired.can_transition_to(TicketStatus::Used));
        assert!(!TicketStatus::Available.can_transition_to(TicketStatus::Available));
    }

    #[test]
    fn test_status_parses_stored_text() {
        assert_eq!("used".parse::<TicketStatus>().unwrap(), TicketStatus::Used);
        assert!("USED".parse::<TicketStatus>().is_err());
        for status in [TicketStatus::Available, TicketStatus::Used, TicketStatus::Expired] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_ticket_serializes_camel_case() {
        let ticket = NewTicket::new(Uuid::new_v4(), "123456789012".to_string(), Utc::now())
            .into_ticket();
        let json = serde_json::to_value(&ticket).unwrap();

        assert_eq!(json["status"], "available");
        assert_eq!(json["barcode"], "123456789012");
        assert!(json.get("userId").is_some());
        assert!(json["validatedAt"].is_null());
    }
}
