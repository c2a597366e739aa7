use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{ensure_forward, StoreError, TicketStore};
use crate::models::{NewTicket, Ticket, TicketStatus, User};

const TICKET_COLUMNS: &str = "id, user_id, barcode, status, created_at, validated_at, updated_at";

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateBarcode,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn count_outstanding(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE user_id = $1 AND status = 'available'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn barcode_exists(&self, barcode: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickets WHERE barcode = $1)")
                .bind(barcode)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_batch(
        &self,
        user_id: Uuid,
        tickets: Vec<NewTicket>,
        max_outstanding: i64,
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serializes issuance per user until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let outstanding: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE user_id = $1 AND status = 'available'",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if outstanding + tickets.len() as i64 > max_outstanding {
            return Err(StoreError::QuotaExceeded {
                user_id,
                outstanding,
            });
        }

        let insert = format!(
            "INSERT INTO tickets (id, user_id, barcode, status, created_at, updated_at) \
             VALUES ($1, $2, $3, 'available', $4, $4) RETURNING {}",
            TICKET_COLUMNS
        );

        let mut created = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let row: Ticket = sqlx::query_as(&insert)
                .bind(ticket.id)
                .bind(ticket.user_id)
                .bind(&ticket.barcode)
                .bind(ticket.created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_insert_error)?;
            created.push(row);
        }

        tx.commit().await?;
        debug!(%user_id, count = created.len(), "Inserted ticket batch");
        Ok(created)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let query = format!(
            "SELECT {} FROM tickets WHERE user_id = $1 ORDER BY created_at ASC",
            TICKET_COLUMNS
        );
        let tickets = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Ticket>, StoreError> {
        let query = format!("SELECT {} FROM tickets WHERE barcode = $1", TICKET_COLUMNS);
        let ticket = sqlx::query_as(&query)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn oldest_available_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Ticket>, StoreError> {
        let query = format!(
            "SELECT {} FROM tickets WHERE user_id = $1 AND status = 'available' \
             ORDER BY created_at ASC, id ASC LIMIT 1",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn transition_by_barcode(
        &self,
        barcode: &str,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        ensure_forward(to)?;
        let query = format!(
            "UPDATE tickets SET status = $2, updated_at = $3, \
             validated_at = CASE WHEN $2 = 'used' THEN $3 ELSE validated_at END \
             WHERE barcode = $1 AND status = 'available' RETURNING {}",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as(&query)
            .bind(barcode)
            .bind(to)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn transition_by_id(
        &self,
        id: Uuid,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        ensure_forward(to)?;
        let query = format!(
            "UPDATE tickets SET status = $2, updated_at = $3, \
             validated_at = CASE WHEN $2 = 'used' THEN $3 ELSE validated_at END \
             WHERE id = $1 AND status = 'available' RETURNING {}",
            TICKET_COLUMNS
        );
        let ticket = sqlx::query_as(&query)
            .bind(id)
            .bind(to)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn find_user_by_uid(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as("SELECT id, uid, username, created_at FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
