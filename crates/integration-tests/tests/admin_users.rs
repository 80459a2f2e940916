//! Administrator user management over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use smart_print_integration_tests::{PASSWORD, TestApp};

async fn admin_session(app: &TestApp) -> String {
    app.seed_user("admin@b.co", "Site", "Admin", true).await;
    app.login("admin@b.co", PASSWORD, true).await
}

#[tokio::test]
async fn test_list_users_paginates_and_searches() {
    let app = TestApp::new();
    let cookie = admin_session(&app).await;
    for i in 0..3 {
        app.seed_user(&format!("cust{i}@b.co"), "Cust", &format!("N{i}"), false)
            .await;
    }

    let page = app.get_as(&cookie, "/api/auth/users?page=1&limit=2").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["total"], 4);
    assert_eq!(page.body["pages"], 2);
    assert_eq!(page.body["users"].as_array().unwrap().len(), 2);

    let found = app.get_as(&cookie, "/api/auth/users?search=cust1").await;
    let users = found.body["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "cust1@b.co");
}

#[tokio::test]
async fn test_customer_cannot_manage_users() {
    let app = TestApp::new();
    app.seed_user("cust@b.co", "C", "U", false).await;
    let cookie = app.login("cust@b.co", PASSWORD, false).await;

    let response = app.get_as(&cookie, "/api/auth/users").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Not authorized as an admin");
}

#[tokio::test]
async fn test_block_and_unblock() {
    let app = TestApp::new();
    let cookie = admin_session(&app).await;
    let customer = app.seed_user("cust@b.co", "C", "U", false).await;
    let customer_session = app.login("cust@b.co", PASSWORD, false).await;

    let blocked = app
        .put_as(
            &cookie,
            &format!("/api/auth/users/{}/block", customer.id),
            json!({}),
        )
        .await;
    assert_eq!(blocked.status, StatusCode::OK);
    assert_eq!(blocked.message(), "User blocked successfully");
    assert_eq!(blocked.body["user"]["isBlocked"], true);

    // Existing sessions stop working and new logins are refused.
    let profile = app.get_as(&customer_session, "/api/auth/profile").await;
    assert_eq!(profile.status, StatusCode::FORBIDDEN);
    let login = app
        .post(
            "/api/auth/login",
            json!({ "email": "cust@b.co", "password": PASSWORD }),
        )
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);

    let unblocked = app
        .put_as(
            &cookie,
            &format!("/api/auth/users/{}/unblock", customer.id),
            json!({}),
        )
        .await;
    assert_eq!(unblocked.status, StatusCode::OK);
    assert_eq!(unblocked.message(), "User unblocked successfully");
    app.login("cust@b.co", PASSWORD, false).await;
}

#[tokio::test]
async fn test_admin_accounts_are_protected() {
    let app = TestApp::new();
    let cookie = admin_session(&app).await;
    let other = app.seed_user("other@b.co", "O", "A", true).await;

    let block = app
        .put_as(
            &cookie,
            &format!("/api/auth/users/{}/block", other.id),
            json!({}),
        )
        .await;
    assert_eq!(block.status, StatusCode::BAD_REQUEST);

    let delete = app
        .delete_as(&cookie, &format!("/api/auth/users/{}", other.id))
        .await;
    assert_eq!(delete.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_customer() {
    let app = TestApp::new();
    let cookie = admin_session(&app).await;
    let customer = app.seed_user("cust@b.co", "C", "U", false).await;

    let deleted = app
        .delete_as(&cookie, &format!("/api/auth/users/{}", customer.id))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.message(), "User removed");

    let again = app
        .delete_as(&cookie, &format!("/api/auth/users/{}", customer.id))
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}
