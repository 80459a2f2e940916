//! Persistence for the API.
//!
//! Each store is a trait with a `PostgreSQL` implementation used in
//! production and an in-memory implementation (see [`memory`]) used by
//! tests and local tooling.
//!
//! ## Tables
//!
//! - `users` - Accounts (argon2id password hashes, admin and block flags)
//! - `otp_codes` - Pending one-time codes, unique per `(email, purpose)`
//! - `orders` - Customer orders and payment results
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p smart-print-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod otps;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use thiserror::Error;

pub use memory::{MemoryOrderStore, MemoryOtpLedger, MemoryUserStore};
pub use orders::{OrderStore, PgOrderStore};
pub use otps::{OtpLedger, PgOtpLedger};
pub use users::{CredentialStore, PgUserStore};

/// Upper bound on any single statement, set per connection.
const STATEMENT_TIMEOUT: &str = "SET statement_timeout = '15s'";

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Password could not be hashed before writing.
    #[error("password hashing failed")]
    PasswordHash,
}

/// Map a unique-constraint violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(STATEMENT_TIMEOUT).await?;
                Ok(())
            })
        })
        .connect(database_url.expose_secret())
        .await
}
