//! Orders store.
//!
//! Orders are created exactly once per checkout: the UNIQUE constraint on
//! `checkout_id` collapses redelivered events into `OrderError::Duplicate`,
//! which the consumer treats as success.

use std::collections::HashMap;

use async_trait::async_trait;
use sea_query::{ColumnDef, Expr, Iden, PostgresQueryBuilder, Table};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::domain::{Order, OrderItem, OrderStatus};

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors from order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("order already exists for checkout {0}")]
    Duplicate(Uuid),

    #[error("invalid status in database: {0}")]
    InvalidStatus(String),

    #[error("items column is not valid JSON: {0}")]
    Items(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Interface for order persistence and queries.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert an order. `OrderError::Duplicate` when an order for the same
    /// checkout already exists.
    async fn create_order(&self, order: &Order) -> Result<()>;

    /// Fetch one order by id.
    async fn get_order(&self, id: Uuid) -> Result<Order>;

    /// All orders for a user, newest first.
    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>>;
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Iden)]
enum Orders {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "checkout_id"]
    CheckoutId,
    #[iden = "user_id"]
    UserId,
    #[iden = "total_amount"]
    TotalAmount,
    #[iden = "currency"]
    Currency,
    #[iden = "status"]
    Status,
    #[iden = "items"]
    Items,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

// ============================================================================
// PostgreSQL implementation
// ============================================================================

/// PostgreSQL implementation of [`OrderStore`].
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.uri())
            .await?;

        info!(host = %config.host, database = %config.database, "Connected to PostgreSQL");

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the orders table if it does not exist.
    pub async fn init(&self) -> Result<()> {
        let create_table = Table::create()
            .table(Orders::Table)
            .if_not_exists()
            .col(ColumnDef::new(Orders::Id).uuid().primary_key())
            .col(
                ColumnDef::new(Orders::CheckoutId)
                    .uuid()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(Orders::UserId).text().not_null())
            .col(ColumnDef::new(Orders::TotalAmount).double().not_null())
            .col(ColumnDef::new(Orders::Currency).text().not_null())
            .col(ColumnDef::new(Orders::Status).text().not_null())
            .col(ColumnDef::new(Orders::Items).json_binary().not_null())
            .col(
                ColumnDef::new(Orders::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Orders::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_table).execute(&self.pool).await?;

        info!("Orders schema initialized");
        Ok(())
    }

    fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order> {
        let status_str: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_str)
            .ok_or_else(|| OrderError::InvalidStatus(status_str.clone()))?;

        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items_json)?;

        Ok(Order {
            id: row.try_get("id")?,
            checkout_id: row.try_get("checkout_id")?,
            user_id: row.try_get("user_id")?,
            total_amount: row.try_get("total_amount")?,
            currency: row.try_get("currency")?,
            status,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        let items = serde_json::to_value(&order.items)?;

        let result = sqlx::query(
            "INSERT INTO orders \
             (id, checkout_id, user_id, total_amount, currency, status, items, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())",
        )
        .bind(order.id)
        .bind(order.checkout_id)
        .bind(&order.user_id)
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&items)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(OrderError::Duplicate(order.checkout_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        let row = sqlx::query(
            "SELECT id, checkout_id, user_id, total_amount, currency, status, items, \
                    created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(OrderError::OrderNotFound(id))?;

        Self::order_from_row(&row)
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, checkout_id, user_id, total_amount, currency, status, items, \
                    created_at, updated_at \
             FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::order_from_row).collect()
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory implementation of [`OrderStore`] for tests and single-process
/// runs. The checkout-id uniqueness check mirrors the UNIQUE constraint.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_for_checkout(&self, checkout_id: Uuid) -> Option<Order> {
        self.orders
            .read()
            .await
            .values()
            .find(|o| o.checkout_id == checkout_id)
            .cloned()
    }

    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.checkout_id == order.checkout_id) {
            return Err(OrderError::Duplicate(order.checkout_id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(id))
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn order(user_id: &str, checkout_id: Uuid) -> Order {
        Order {
            id: Uuid::new_v4(),
            checkout_id,
            user_id: user_id.to_string(),
            total_amount: 59.98,
            currency: "USD".to_string(),
            status: OrderStatus::Confirmed,
            items: vec![OrderItem {
                product_id: 1,
                product_name: "Widget".to_string(),
                quantity: 2,
                price: 29.99,
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_checkout_id_is_rejected() {
        let store = MemoryOrderStore::new();
        let checkout_id = Uuid::new_v4();

        store.create_order(&order("123", checkout_id)).await.unwrap();
        let err = store
            .create_order(&order("123", checkout_id))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Duplicate(id) if id == checkout_id));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn list_orders_is_newest_first() {
        let store = MemoryOrderStore::new();

        let mut first = order("123", Uuid::new_v4());
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let second = order("123", Uuid::new_v4());
        let other_user = order("999", Uuid::new_v4());

        store.create_order(&first).await.unwrap();
        store.create_order(&second).await.unwrap();
        store.create_order(&other_user).await.unwrap();

        let orders = store.list_orders("123").await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, second.id);
        assert_eq!(orders[1].id, first.id);
    }

    #[tokio::test]
    async fn get_missing_order_reports_not_found() {
        let store = MemoryOrderStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.get_order(id).await,
            Err(OrderError::OrderNotFound(missing)) if missing == id
        ));
    }
}
