//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use smart_print_core::{OrderId, PaymentStatus, UserId};

/// A line item on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(alias = "title")]
    pub name: String,
    pub qty: u32,
    #[serde(default)]
    pub image: String,
    pub price: Decimal,
    /// Catalogue product reference.
    pub product: String,
}

/// Delivery address captured at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Provider confirmation recorded when an order is paid.
///
/// Field names follow the provider callback shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// Provider payment reference.
    pub id: String,
    pub status: String,
    pub update_time: DateTime<Utc>,
    pub email_address: String,
}

impl PaymentResult {
    /// Result for a payment whose signature checked out.
    #[must_use]
    pub fn paid(payment_ref: &str, payer_email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: payment_ref.to_owned(),
            status: PaymentStatus::Paid.as_str().to_owned(),
            update_time: now,
            email_address: payer_email.to_owned(),
        }
    }
}

/// Status given to new orders.
pub const DEFAULT_ORDER_STATUS: &str = "Pending";

/// Status that marks an order delivered.
pub const DELIVERED_STATUS: &str = "Delivered";

/// Where a shipment is and when it should arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tracking {
    pub current_location: Option<String>,
    pub est_time: Option<String>,
}

/// An administrator's status change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub current_location: Option<String>,
    pub est_time: Option<String>,
}

impl StatusUpdate {
    /// Build an update, treating blank fields as omitted.
    #[must_use]
    pub fn new(
        status: Option<String>,
        current_location: Option<String>,
        est_time: Option<String>,
    ) -> Self {
        let keep = |v: Option<String>| {
            v.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
        };
        Self {
            status: keep(status),
            current_location: keep(current_location),
            est_time: keep(est_time),
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    #[serde(rename = "user")]
    pub user_id: UserId,
    #[serde(rename = "orderItems")]
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResult>,
    pub status: String,
    pub tracking: Tracking,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Apply a status change. Reaching [`DELIVERED_STATUS`] marks the order
    /// delivered at `now`.
    pub fn apply_status(&mut self, update: StatusUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(location) = update.current_location {
            self.tracking.current_location = Some(location);
        }
        if let Some(est_time) = update.est_time {
            self.tracking.est_time = Some(est_time);
        }
        if self.status == DELIVERED_STATUS {
            self.is_delivered = true;
            self.delivered_at = Some(now);
        }
    }

    /// Record a verified payment. Repeating this with the same inputs
    /// leaves the order in the same state.
    pub fn mark_paid(&mut self, result: PaymentResult) {
        self.is_paid = true;
        self.paid_at = Some(result.update_time);
        self.payment_result = Some(result);
    }
}

/// Fields required to create an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new(7),
            user_id: UserId::new(1),
            items: vec![OrderItem {
                name: "Toner".to_owned(),
                qty: 2,
                image: String::new(),
                price: Decimal::new(1999, 2),
                product: "toner-01".to_owned(),
            }],
            shipping_address: ShippingAddress::default(),
            payment_method: "Razorpay".to_owned(),
            items_price: Decimal::new(3998, 2),
            tax_price: Decimal::ZERO,
            shipping_price: Decimal::ZERO,
            total_price: Decimal::new(3998, 2),
            is_paid: false,
            paid_at: None,
            payment_result: None,
            status: DEFAULT_ORDER_STATUS.to_owned(),
            tracking: Tracking::default(),
            is_delivered: false,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_mark_paid_overwrites() {
        let mut order = order();
        let now = Utc::now();
        order.mark_paid(PaymentResult::paid("pay_1", "a@b.co", now));
        let first = order.clone();
        order.mark_paid(PaymentResult::paid("pay_1", "a@b.co", now));

        assert!(order.is_paid);
        assert_eq!(order.paid_at, Some(now));
        assert_eq!(order.payment_result, first.payment_result);
        assert_eq!(order.payment_result.unwrap().status, "paid");
    }

    #[test]
    fn test_order_serializes_camel_case() {
        let json = serde_json::to_value(order()).unwrap();
        assert_eq!(json["_id"], 7);
        assert_eq!(json["isPaid"], false);
        assert_eq!(json["orderItems"][0]["qty"], 2);
        assert_eq!(json["totalPrice"], "39.98");
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["isDelivered"], false);
    }

    #[test]
    fn test_apply_status_keeps_omitted_fields() {
        let mut order = order();
        let now = Utc::now();
        order.apply_status(
            StatusUpdate::new(Some("Shipped".to_owned()), Some("Pune hub".to_owned()), None),
            now,
        );
        order.apply_status(
            StatusUpdate::new(None, Some("  ".to_owned()), Some("2 days".to_owned())),
            now,
        );

        assert_eq!(order.status, "Shipped");
        assert_eq!(order.tracking.current_location.as_deref(), Some("Pune hub"));
        assert_eq!(order.tracking.est_time.as_deref(), Some("2 days"));
        assert!(!order.is_delivered);
        assert!(order.delivered_at.is_none());
    }

    #[test]
    fn test_apply_status_delivered() {
        let mut order = order();
        let now = Utc::now();
        order.apply_status(StatusUpdate::new(Some("Delivered".to_owned()), None, None), now);

        assert!(order.is_delivered);
        assert_eq!(order.delivered_at, Some(now));
    }
}
