//! CLI subcommand implementations.

pub mod migrate;
pub mod otp;
pub mod user;

use smart_print_api::config::{ConfigError, database_url_from_env};
use smart_print_api::db::create_pool;
use sqlx::PgPool;

/// Connect to the API database named by the environment.
pub(crate) async fn connect() -> Result<PgPool, CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to database...");
    Ok(create_pool(&database_url).await?)
}

/// Errors shared by all commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Session store setup failed.
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] smart_print_api::db::RepositoryError),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    Invalid(String),
}
