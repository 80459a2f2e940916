//! Orders and payment verification over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::{Value, json};

use smart_print_integration_tests::{PASSWORD, TestApp};

fn order_body() -> Value {
    json!({
        "orderItems": [
            { "name": "Poster A2", "qty": 2, "image": "/img/a2.png", "price": "12.50", "product": "p-1" }
        ],
        "shippingAddress": {
            "address": "1 Main St",
            "city": "Pune",
            "postalCode": "411001",
            "country": "IN"
        },
        "itemsPrice": "25.00",
        "taxPrice": "4.50",
        "shippingPrice": "0.00",
        "totalPrice": "29.50"
    })
}

async fn customer(app: &TestApp, email: &str) -> String {
    app.seed_user(email, "C", "U", false).await;
    app.login(email, PASSWORD, false).await
}

async fn place_order(app: &TestApp, cookie: &str) -> i64 {
    let created = app.post_as(cookie, "/api/orders", order_body()).await;
    assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
    created.body["_id"].as_i64().unwrap()
}

fn callback(order_id: i64, signature: &str) -> Value {
    json!({
        "razorpay_order_id": "order_Abc123",
        "razorpay_payment_id": "pay_Xyz789",
        "razorpay_signature": signature,
        "orderId": order_id,
    })
}

#[tokio::test]
async fn test_create_order_and_list_mine() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;

    let created = app.post_as(&cookie, "/api/orders", order_body()).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["paymentMethod"], "Razorpay");
    assert_eq!(created.body["isPaid"], false);
    assert_eq!(created.body["totalPrice"], "29.50");

    let mine = app.get_as(&cookie, "/api/orders/mine").await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_order_rejected() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;

    let response = app
        .post_as(&cookie, "/api/orders", json!({ "orderItems": [] }))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "No order items");
}

#[tokio::test]
async fn test_orders_hidden_from_other_customers() {
    let app = TestApp::new();
    let owner = customer(&app, "a@b.co").await;
    let other = customer(&app, "c@d.co").await;
    let id = place_order(&app, &owner).await;

    let own = app.get_as(&owner, &format!("/api/orders/{id}")).await;
    assert_eq!(own.status, StatusCode::OK);

    let foreign = app.get_as(&other, &format!("/api/orders/{id}")).await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);

    app.seed_user("admin@b.co", "Ad", "Min", true).await;
    let admin = app.login("admin@b.co", PASSWORD, true).await;
    let as_admin = app.get_as(&admin, &format!("/api/orders/{id}")).await;
    assert_eq!(as_admin.status, StatusCode::OK);
}

#[tokio::test]
async fn test_tampered_signature_writes_nothing() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;
    let id = place_order(&app, &cookie).await;

    let mut signature = TestApp::sign("order_Abc123", "pay_Xyz789");
    let last = if signature.ends_with('0') { "1" } else { "0" };
    let end = signature.len() - 1;
    signature.replace_range(end.., last);

    let response = app
        .post_as(&cookie, "/api/orders/verify-payment", callback(id, &signature))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Invalid signature sent!");
    assert_eq!(app.orders.payment_writes(), 0);

    let order = app.get_as(&cookie, &format!("/api/orders/{id}")).await;
    assert_eq!(order.body["isPaid"], false);
}

#[tokio::test]
async fn test_valid_signature_marks_paid() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;
    let id = place_order(&app, &cookie).await;
    let signature = TestApp::sign("order_Abc123", "pay_Xyz789");

    let response = app
        .post_as(&cookie, "/api/orders/verify-payment", callback(id, &signature))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.message(), "Payment verified successfully");

    let order = app.get_as(&cookie, &format!("/api/orders/{id}")).await;
    assert_eq!(order.body["isPaid"], true);
    assert_eq!(order.body["paymentResult"]["id"], "pay_Xyz789");
    assert_eq!(order.body["paymentResult"]["email_address"], "a@b.co");
    let paid_at = order.body["paidAt"].clone();

    // A replayed callback leaves the order as it was.
    let replay = app
        .post_as(&cookie, "/api/orders/verify-payment", callback(id, &signature))
        .await;
    assert_eq!(replay.status, StatusCode::OK);
    let order = app.get_as(&cookie, &format!("/api/orders/{id}")).await;
    assert_eq!(order.body["isPaid"], true);
    assert_eq!(order.body["paidAt"], paid_at);
}

#[tokio::test]
async fn test_unknown_order_not_found() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;
    let signature = TestApp::sign("order_Abc123", "pay_Xyz789");

    let response = app
        .post_as(&cookie, "/api/orders/verify-payment", callback(999, &signature))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.message(), "Order not found");
}

#[tokio::test]
async fn test_orders_require_session() {
    let app = TestApp::new();

    let response = app
        .request(axum::http::Method::GET, "/api/orders/mine", None, None)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_signature_for_missing_order_is_invalid_signature() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;

    let response = app
        .post_as(
            &cookie,
            "/api/orders/verify-payment",
            callback(999, "00".repeat(32).as_str()),
        )
        .await;

    // Same answer as for an existing order, so ids are not revealed.
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "Invalid signature sent!");
    assert_eq!(app.orders.payment_writes(), 0);
}

#[tokio::test]
async fn test_admin_lists_all_orders() {
    let app = TestApp::new();
    let first = customer(&app, "a@b.co").await;
    let second = customer(&app, "c@d.co").await;
    place_order(&app, &first).await;
    let newest = place_order(&app, &second).await;

    let denied = app.get_as(&first, "/api/orders").await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    app.seed_user("admin@b.co", "Ad", "Min", true).await;
    let admin = app.login("admin@b.co", PASSWORD, true).await;
    let all = app.get_as(&admin, "/api/orders").await;
    assert_eq!(all.status, StatusCode::OK);
    let orders = all.body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["_id"].as_i64().unwrap(), newest);
}

#[tokio::test]
async fn test_admin_updates_status_until_delivered() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;
    let id = place_order(&app, &cookie).await;
    app.seed_user("admin@b.co", "Ad", "Min", true).await;
    let admin = app.login("admin@b.co", PASSWORD, true).await;
    let uri = format!("/api/orders/{id}/status");

    let denied = app
        .put_as(&cookie, &uri, json!({ "status": "Delivered" }))
        .await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let shipped = app
        .put_as(
            &admin,
            &uri,
            json!({ "status": "Shipped", "currentLocation": "Pune hub", "estTime": "2 days" }),
        )
        .await;
    assert_eq!(shipped.status, StatusCode::OK);
    assert_eq!(shipped.body["status"], "Shipped");
    assert_eq!(shipped.body["tracking"]["currentLocation"], "Pune hub");
    assert_eq!(shipped.body["isDelivered"], false);

    let delivered = app
        .put_as(&admin, &uri, json!({ "status": "Delivered" }))
        .await;
    assert_eq!(delivered.status, StatusCode::OK);
    assert_eq!(delivered.body["isDelivered"], true);
    assert!(delivered.body["deliveredAt"].is_string());
    assert_eq!(delivered.body["tracking"]["estTime"], "2 days");

    // Status changes never touch payment state.
    assert_eq!(delivered.body["isPaid"], false);
    assert_eq!(app.orders.payment_writes(), 0);

    let missing = app
        .put_as(&admin, "/api/orders/999/status", json!({ "status": "Shipped" }))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.message(), "Order not found");
}

#[tokio::test]
async fn test_new_order_starts_pending() {
    let app = TestApp::new();
    let cookie = customer(&app, "a@b.co").await;

    let created = app.post_as(&cookie, "/api/orders", order_body()).await;

    assert_eq!(created.body["status"], "Pending");
    assert_eq!(created.body["isDelivered"], false);
    assert!(created.body["deliveredAt"].is_null());
}
