//! Order route handlers.
//!
//! Order creation and lookup, plus the payment provider callback that
//! marks an order paid once its signature checks out.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use smart_print_core::OrderId;

use crate::db::{OrderStore, RepositoryError};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::order::{NewOrder, Order, OrderItem, ShippingAddress, StatusUpdate};
use crate::services::clock::Clock;
use crate::services::payment::PaymentCallback;
use crate::state::AppState;

/// Default payment method when the client does not name one.
const DEFAULT_PAYMENT_METHOD: &str = "Razorpay";

/// Order creation body.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOrderRequest {
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: Option<String>,
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
}

/// Payment provider callback body. Field names are fixed by the provider.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "orderId")]
    pub order_id: i32,
}

/// Admin status change body. Omitted or empty fields are left unchanged.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub current_location: Option<String>,
    pub est_time: Option<String>,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct PaymentVerifiedResponse {
    pub message: String,
}

/// POST /api/orders
///
/// # Errors
///
/// 400 "No order items" for an empty order.
#[instrument(skip_all, fields(user_id = tracing::field::Empty))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Response> {
    tracing::Span::current().record("user_id", user.id.as_i32());

    if body.order_items.is_empty() {
        return Err(AppError::BadRequest("No order items".to_string()));
    }

    let order = state
        .orders()
        .create(NewOrder {
            user_id: user.id,
            items: body.order_items,
            shipping_address: body.shipping_address,
            payment_method: body
                .payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            items_price: body.items_price,
            tax_price: body.tax_price,
            shipping_price: body.shipping_price,
            total_price: body.total_price,
        })
        .await?;

    tracing::info!(order_id = %order.id, total = %order.total_price, "Order created");
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

/// GET /api/orders/mine
///
/// # Errors
///
/// 401 without a session.
#[instrument(skip_all)]
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = state.orders().list_for_user(user.id).await?;
    Ok(Json(orders))
}

/// GET /api/orders
///
/// # Errors
///
/// 401 without an admin session.
#[instrument(skip_all)]
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<Order>>> {
    let orders = state.orders().list_all().await?;
    Ok(Json(orders))
}

/// PUT /api/orders/{id}/status
///
/// # Errors
///
/// 401 without an admin session, 404 "Order not found" for an unknown order.
#[instrument(skip(state, _admin, body))]
pub async fn update_status(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    let update = StatusUpdate::new(body.status, body.current_location, body.est_time);
    let order = state
        .orders()
        .update_status(OrderId::new(id), update, state.clock().now())
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Order not found".to_string()),
            other => other.into(),
        })?;

    tracing::info!(
        order_id = %order.id,
        status = %order.status,
        delivered = order.is_delivered,
        "Order status updated"
    );
    Ok(Json(order))
}

/// GET /api/orders/{id}
///
/// Visible to the customer who placed the order and to administrators.
///
/// # Errors
///
/// 404 if the order does not exist or belongs to someone else.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .find_by_id(OrderId::new(id))
        .await?
        .filter(|order| user.is_admin || order.user_id == user.id)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    Ok(Json(order))
}

/// POST /api/orders/verify-payment
///
/// # Errors
///
/// 400 "Invalid signature sent!" on mismatch (nothing is written),
/// 404 "Order not found" for an unknown order.
#[instrument(skip_all)]
pub async fn verify_payment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentVerifiedResponse>> {
    let order = state
        .payment()
        .verify_payment(PaymentCallback {
            order_ref: body.razorpay_order_id,
            payment_ref: body.razorpay_payment_id,
            signature: body.razorpay_signature,
            order_id: OrderId::new(body.order_id),
            payer_email: user.email.to_string(),
        })
        .await?;

    let order_id = order.id.to_string();
    add_breadcrumb(
        "payment",
        "Payment verified",
        Some(&[("order_id", order_id.as_str())]),
    );

    Ok(Json(PaymentVerifiedResponse {
        message: "Payment verified successfully".to_string(),
    }))
}
