//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                             - Liveness check
//! GET  /health/ready                       - Readiness check (database ping)
//!
//! # Auth (rate limited)
//! POST /api/auth/login                     - Password login (customer or admin)
//! POST /api/auth/send-registration-otp     - Email a registration code
//! POST /api/auth/verify-registration-otp   - Create the account from a code
//! POST /api/auth/forgot-password           - Email a password reset code
//! POST /api/auth/reset-password            - Set a new password from a code
//!
//! # Auth (session)
//! POST /api/auth/logout                    - Clear the session user
//! GET  /api/auth/profile                   - Current profile
//! PUT  /api/auth/profile                   - Update profile
//!
//! # Admin (admin session)
//! GET    /api/auth/users                   - Paginated user list
//! DELETE /api/auth/users/{id}              - Remove a customer
//! PUT    /api/auth/users/{id}/block        - Block a customer
//! PUT    /api/auth/users/{id}/unblock      - Unblock a user
//!
//! # Orders (session)
//! POST /api/orders                         - Create an order
//! GET  /api/orders                         - Every order (admin)
//! GET  /api/orders/mine                    - Orders placed by the current user
//! GET  /api/orders/{id}                    - One order (owner or admin)
//! POST /api/orders/verify-payment          - Payment provider callback
//! PUT  /api/orders/{id}/status             - Status and tracking (admin)
//! ```

pub mod auth;
pub mod orders;
pub mod users;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Routes that accept credentials or codes.
pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/send-registration-otp", post(auth::send_registration_otp))
        .route("/verify-registration-otp", post(auth::verify_registration_otp))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
}

/// Routes that act on the logged-in account.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(auth::logout))
        .route(
            "/profile",
            get(auth::get_profile).put(auth::update_profile),
        )
        .route("/users", get(users::list))
        .route("/users/{id}", axum::routing::delete(users::delete))
        .route("/users/{id}/block", put(users::block))
        .route("/users/{id}/unblock", put(users::unblock))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::create).get(orders::list))
        .route("/mine", get(orders::mine))
        .route("/verify-payment", post(orders::verify_payment))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", put(orders::update_status))
}

/// Create all API routes.
///
/// Rate limits are keyed on the client IP taken from proxy headers and are
/// skipped when `rate_limit` is false.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let mut credentials = credential_routes();
    let mut orders = order_routes();
    if rate_limit {
        credentials = credentials.layer(auth_rate_limiter());
        orders = orders.layer(api_rate_limiter());
    }

    Router::new()
        .nest("/api/auth", credentials.merge(account_routes()))
        .nest("/api/orders", orders)
}
