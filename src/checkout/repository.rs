//! Durable checkout sessions and their outbox events.
//!
//! Sessions and outbox rows live in the same PostgreSQL database so that
//! completing a checkout and recording its event happen in one transaction.
//! `complete_session` is the only place that writes outbox rows; the poller
//! in [`crate::outbox`] drains them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{ColumnDef, Expr, Iden, Index, PostgresQueryBuilder, Table};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::domain::{CheckoutSession, CheckoutStatus};

/// Sessions in `PAYMENT_COMPLETED` older than this with no outbox row are
/// considered stuck and eligible for recovery.
pub const STUCK_THRESHOLD_SECS: i64 = 5 * 60;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors from checkout repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("idempotency key not found")]
    IdempotencyKeyNotFound,

    #[error("checkout session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("invalid status in database: {0}")]
    InvalidStatus(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// An event row awaiting publication. `processed_at = NULL` is the only
/// publishable state.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Interface for checkout session persistence.
#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    /// Look up an existing session by idempotency key.
    async fn get_by_idempotency_key(&self, key: &str) -> Result<(Uuid, CheckoutStatus)>;

    /// Insert a new session. Fails with `DuplicateIdempotencyKey` if the key
    /// is already taken (the UNIQUE constraint closes the probe-then-insert
    /// race).
    async fn create_session(&self, session: &CheckoutSession) -> Result<()>;

    /// Set the session status.
    async fn update_status(&self, id: Uuid, status: CheckoutStatus) -> Result<()>;

    /// Set status and record the inventory reservation id.
    async fn set_reservation(
        &self,
        id: Uuid,
        status: CheckoutStatus,
        reservation_id: &str,
    ) -> Result<()>;

    /// Set status and record the payment id.
    async fn set_payment(&self, id: Uuid, status: CheckoutStatus, payment_id: &str) -> Result<()>;

    /// Transactionally set the session status and insert the outbox event.
    /// This co-commit is what guarantees a completed session always has a
    /// publishable event.
    async fn complete_session(
        &self,
        id: Uuid,
        payload: serde_json::Value,
        status: CheckoutStatus,
    ) -> Result<()>;

    /// Events with `processed_at IS NULL`, oldest first.
    async fn get_unprocessed_events(&self, limit: i64) -> Result<Vec<OutboxEvent>>;

    /// Stamp an event as published.
    async fn mark_event_processed(&self, event_id: i64) -> Result<()>;

    /// Sessions stuck in `PAYMENT_COMPLETED` with no outbox row.
    async fn get_stuck_sessions(&self) -> Result<Vec<CheckoutSession>>;
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Iden)]
enum CheckoutSessions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_id"]
    UserId,
    #[iden = "cart_snapshot"]
    CartSnapshot,
    #[iden = "status"]
    Status,
    #[iden = "idempotency_key"]
    IdempotencyKey,
    #[iden = "inventory_reservation_id"]
    InventoryReservationId,
    #[iden = "payment_id"]
    PaymentId,
    #[iden = "total_amount"]
    TotalAmount,
    #[iden = "currency"]
    Currency,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
enum OutboxEvents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "event_type"]
    EventType,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "processed_at"]
    ProcessedAt,
}

// ============================================================================
// PostgreSQL implementation
// ============================================================================

/// PostgreSQL implementation of [`CheckoutRepository`].
pub struct PostgresCheckoutRepository {
    pool: PgPool,
}

impl PostgresCheckoutRepository {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.uri())
            .await?;

        info!(host = %config.host, database = %config.database, "Connected to PostgreSQL");

        let repo = Self::new(pool);
        repo.init().await?;
        Ok(repo)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkout tables if they do not exist.
    pub async fn init(&self) -> Result<()> {
        let create_sessions = Table::create()
            .table(CheckoutSessions::Table)
            .if_not_exists()
            .col(ColumnDef::new(CheckoutSessions::Id).uuid().primary_key())
            .col(ColumnDef::new(CheckoutSessions::UserId).text().not_null())
            .col(
                ColumnDef::new(CheckoutSessions::CartSnapshot)
                    .json_binary()
                    .not_null(),
            )
            .col(ColumnDef::new(CheckoutSessions::Status).text().not_null())
            .col(
                ColumnDef::new(CheckoutSessions::IdempotencyKey)
                    .text()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(CheckoutSessions::InventoryReservationId).text())
            .col(ColumnDef::new(CheckoutSessions::PaymentId).text())
            .col(
                ColumnDef::new(CheckoutSessions::TotalAmount)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(CheckoutSessions::Currency).text().not_null())
            .col(
                ColumnDef::new(CheckoutSessions::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(CheckoutSessions::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_sessions).execute(&self.pool).await?;

        let create_outbox = Table::create()
            .table(OutboxEvents::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(OutboxEvents::Id)
                    .big_integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(OutboxEvents::AggregateId).uuid().not_null())
            .col(ColumnDef::new(OutboxEvents::EventType).text().not_null())
            .col(ColumnDef::new(OutboxEvents::Payload).json_binary().not_null())
            .col(
                ColumnDef::new(OutboxEvents::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(ColumnDef::new(OutboxEvents::ProcessedAt).timestamp_with_time_zone())
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_outbox).execute(&self.pool).await?;

        // Index for poller scans
        let create_index = Index::create()
            .if_not_exists()
            .name("idx_outbox_events_unprocessed")
            .table(OutboxEvents::Table)
            .col(OutboxEvents::ProcessedAt)
            .col(OutboxEvents::Id)
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_index).execute(&self.pool).await?;

        info!("Checkout schema initialized");
        Ok(())
    }

    fn session_from_row(row: &sqlx::postgres::PgRow) -> Result<CheckoutSession> {
        let status_str: String = row.try_get("status")?;
        let status = CheckoutStatus::parse(&status_str)
            .ok_or_else(|| RepositoryError::InvalidStatus(status_str.clone()))?;

        Ok(CheckoutSession {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            cart_snapshot: row.try_get("cart_snapshot")?,
            status,
            idempotency_key: row.try_get("idempotency_key")?,
            inventory_reservation_id: row.try_get("inventory_reservation_id")?,
            payment_id: row.try_get("payment_id")?,
            total_amount: row.try_get("total_amount")?,
            currency: row.try_get("currency")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

#[async_trait]
impl CheckoutRepository for PostgresCheckoutRepository {
    async fn get_by_idempotency_key(&self, key: &str) -> Result<(Uuid, CheckoutStatus)> {
        let row = sqlx::query("SELECT id, status FROM checkout_sessions WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::IdempotencyKeyNotFound)?;

        let id: Uuid = row.try_get("id")?;
        let status_str: String = row.try_get("status")?;
        let status = CheckoutStatus::parse(&status_str)
            .ok_or(RepositoryError::InvalidStatus(status_str))?;

        Ok((id, status))
    }

    async fn create_session(&self, session: &CheckoutSession) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO checkout_sessions \
             (id, user_id, cart_snapshot, status, idempotency_key, \
              inventory_reservation_id, payment_id, total_amount, currency, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())",
        )
        .bind(session.id)
        .bind(&session.user_id)
        .bind(&session.cart_snapshot)
        .bind(session.status.as_str())
        .bind(&session.idempotency_key)
        .bind(&session.inventory_reservation_id)
        .bind(&session.payment_id)
        .bind(&session.total_amount)
        .bind(&session.currency)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                RepositoryError::DuplicateIdempotencyKey(session.idempotency_key.clone()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(&self, id: Uuid, status: CheckoutStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE checkout_sessions SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::SessionNotFound(id));
        }
        Ok(())
    }

    async fn set_reservation(
        &self,
        id: Uuid,
        status: CheckoutStatus,
        reservation_id: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE checkout_sessions \
             SET status = $2, inventory_reservation_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reservation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::SessionNotFound(id));
        }
        Ok(())
    }

    async fn set_payment(&self, id: Uuid, status: CheckoutStatus, payment_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE checkout_sessions \
             SET status = $2, payment_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::SessionNotFound(id));
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        id: Uuid,
        payload: serde_json::Value,
        status: CheckoutStatus,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE checkout_sessions SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::SessionNotFound(id));
        }

        sqlx::query(
            "INSERT INTO outbox_events (aggregate_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(id)
        .bind(crate::domain::checkout::CHECKOUT_COMPLETED_EVENT)
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_unprocessed_events(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            "SELECT id, aggregate_id, event_type, payload, created_at, processed_at \
             FROM outbox_events WHERE processed_at IS NULL ORDER BY id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::event_from_row).collect()
    }

    async fn mark_event_processed(&self, event_id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET processed_at = NOW() WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_stuck_sessions(&self) -> Result<Vec<CheckoutSession>> {
        let rows = sqlx::query(
            "SELECT cs.id, cs.user_id, cs.cart_snapshot, cs.status, cs.idempotency_key, \
                    cs.inventory_reservation_id, cs.payment_id, cs.total_amount, cs.currency, \
                    cs.created_at, cs.updated_at \
             FROM checkout_sessions cs \
             WHERE cs.status = $1 \
               AND cs.updated_at < NOW() - make_interval(secs => $2) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM outbox_events oe WHERE oe.aggregate_id = cs.id \
               )",
        )
        .bind(CheckoutStatus::PaymentCompleted.as_str())
        .bind(STUCK_THRESHOLD_SECS as f64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::session_from_row).collect()
    }
}
