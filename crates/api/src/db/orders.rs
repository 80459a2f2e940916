//! Order persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use smart_print_core::{OrderId, UserId};

use super::RepositoryError;
use crate::models::order::{
    NewOrder, Order, OrderItem, PaymentResult, ShippingAddress, StatusUpdate, Tracking,
    DELIVERED_STATUS,
};

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new, unpaid order.
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Look up an order by id.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// All orders placed by a user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError>;

    /// Apply a status change (see [`Order::apply_status`]).
    ///
    /// Fails with [`RepositoryError::NotFound`] if the order does not exist.
    async fn update_status(
        &self,
        id: OrderId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;

    /// Mark an order paid, overwriting any previous payment result.
    ///
    /// Fails with [`RepositoryError::NotFound`] if the order does not exist.
    async fn save_payment(
        &self,
        id: OrderId,
        result: PaymentResult,
    ) -> Result<Order, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

const ORDER_COLUMNS: &str = "id, user_id, items, shipping_address, payment_method, \
                             items_price, tax_price, shipping_price, total_price, \
                             is_paid, paid_at, payment_result, status, tracking, \
                             is_delivered, delivered_at, created_at";

/// Internal row type for `PostgreSQL` order queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    items: Json<Vec<OrderItem>>,
    shipping_address: Json<ShippingAddress>,
    payment_method: String,
    items_price: Decimal,
    tax_price: Decimal,
    shipping_price: Decimal,
    total_price: Decimal,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    payment_result: Option<Json<PaymentResult>>,
    status: String,
    tracking: Json<Tracking>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            items: row.items.0,
            shipping_address: row.shipping_address.0,
            payment_method: row.payment_method,
            items_price: row.items_price,
            tax_price: row.tax_price,
            shipping_price: row.shipping_price,
            total_price: row.total_price,
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            payment_result: row.payment_result.map(|Json(r)| r),
            status: row.status,
            tracking: row.tracking.0,
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (user_id, items, shipping_address, payment_method,
                                items_price, tax_price, shipping_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(Json(&order.shipping_address))
        .bind(&order.payment_method)
        .bind(order.items_price)
        .bind(order.tax_price)
        .bind(order.shipping_price)
        .bind(order.total_price)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders SET
                status = COALESCE($2, status),
                tracking = jsonb_build_object(
                    'currentLocation', COALESCE($3, tracking->>'currentLocation'),
                    'estTime', COALESCE($4, tracking->>'estTime')
                ),
                is_delivered = is_delivered OR COALESCE($2, status) = $5,
                delivered_at = CASE WHEN COALESCE($2, status) = $5 THEN $6 ELSE delivered_at END
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.status)
        .bind(update.current_location)
        .bind(update.est_time)
        .bind(DELIVERED_STATUS)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn save_payment(
        &self,
        id: OrderId,
        result: PaymentResult,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders SET is_paid = TRUE, paid_at = $2, payment_result = $3
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(result.update_time)
        .bind(Json(&result))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }
}
