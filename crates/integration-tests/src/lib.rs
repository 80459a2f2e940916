//! Integration tests for smart-print.
//!
//! Tests drive the real router in-process with `tower::ServiceExt::oneshot`.
//! Storage is in memory, email goes to a [`RecordingGateway`], sessions use
//! `tower_sessions::MemoryStore`, and time is a [`ManualClock`] the test moves.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p smart-print-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `registration` - OTP-gated account creation
//! - `password_reset` - OTP-gated password reset
//! - `login` - Login, logout, profile
//! - `admin_users` - Admin user management
//! - `payments` - Orders and payment verification

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use smart_print_api::app;
use smart_print_api::db::{
    CredentialStore, MemoryOrderStore, MemoryOtpLedger, MemoryUserStore,
};
use smart_print_api::middleware::session_layer;
use smart_print_api::models::user::{NewUser, User};
use smart_print_api::services::clock::ManualClock;
use smart_print_api::services::email::RecordingGateway;
use smart_print_api::services::otp::OtpSettings;
use smart_print_api::services::payment::expected_signature;
use smart_print_api::state::{AppState, Backends, StateSettings};
use smart_print_core::{Email, OtpCode};

/// Shared key the fake payment provider signs with.
pub const PAYMENT_KEY: &str = "rzp_test_secret_for_integration";

/// Password used for seeded accounts.
pub const PASSWORD: &str = "s3cret-passw0rd";

/// A running application plus handles on its backends.
pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryUserStore>,
    pub ledger: Arc<MemoryOtpLedger>,
    pub orders: Arc<MemoryOrderStore>,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<ManualClock>,
}

/// A response with its body parsed as JSON (`Value::Null` if empty).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub cookie: Option<String>,
}

impl TestResponse {
    /// The `message` field of the body.
    #[must_use]
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    /// Build the application over fresh in-memory backends.
    #[must_use]
    pub fn new() -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let ledger = Arc::new(MemoryOtpLedger::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));

        let state = AppState::with_backends(
            Backends {
                users: users.clone(),
                ledger: ledger.clone(),
                orders: orders.clone(),
                gateway: gateway.clone(),
                clock: clock.clone(),
            },
            StateSettings {
                otp: OtpSettings::default(),
                sweep_interval: std::time::Duration::from_secs(300),
                payment_key: SecretString::from(PAYMENT_KEY),
                rate_limit: false,
            },
        );

        let router = app(state, session_layer(MemoryStore::default(), false));

        Self {
            router,
            users,
            ledger,
            orders,
            gateway,
            clock,
        }
    }

    /// Send a request, optionally with a JSON body and a session cookie.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_owned);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            body,
            cookie,
        }
    }

    /// POST a JSON body.
    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body), None).await
    }

    /// POST a JSON body inside a session.
    pub async fn post_as(&self, cookie: &str, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body), Some(cookie))
            .await
    }

    /// GET inside a session.
    pub async fn get_as(&self, cookie: &str, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, Some(cookie)).await
    }

    /// PUT a JSON body inside a session.
    pub async fn put_as(&self, cookie: &str, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), Some(cookie))
            .await
    }

    /// DELETE inside a session.
    pub async fn delete_as(&self, cookie: &str, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None, Some(cookie)).await
    }

    /// Seed an account directly in the store.
    pub async fn seed_user(&self, email: &str, first: &str, last: &str, is_admin: bool) -> User {
        self.users
            .create(NewUser {
                first_name: first.to_owned(),
                last_name: last.to_owned(),
                email: Email::parse(email).unwrap(),
                password: SecretString::from(PASSWORD),
                is_admin,
            })
            .await
            .unwrap()
    }

    /// Log in and return the session cookie.
    pub async fn login(&self, email: &str, password: &str, admin: bool) -> String {
        let response = self
            .post(
                "/api/auth/login",
                serde_json::json!({
                    "email": email,
                    "password": password,
                    "isAdminLogin": admin,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
        response.cookie.expect("login sets a session cookie")
    }

    /// The latest code emailed to `email`.
    #[must_use]
    pub fn last_code(&self, email: &str) -> OtpCode {
        self.gateway
            .last_code_for(&Email::parse(email).unwrap())
            .expect("a code was emailed")
    }

    /// A provider signature for the given references.
    #[must_use]
    pub fn sign(order_ref: &str, payment_ref: &str) -> String {
        expected_signature(&SecretString::from(PAYMENT_KEY), order_ref, payment_ref).unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A six-digit code guaranteed to differ from `code`.
#[must_use]
pub fn wrong_code(code: &OtpCode) -> String {
    let n: u32 = code.as_str().parse().unwrap();
    OtpCode::from_number(n + 1).to_string()
}
