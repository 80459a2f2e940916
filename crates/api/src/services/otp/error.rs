//! OTP flow error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors from requesting or verifying a one-time code.
#[derive(Debug, Error)]
pub enum OtpError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// The account already exists (registration).
    #[error("{0}")]
    Conflict(String),

    /// No account for this email (password reset).
    #[error("User not found")]
    NotFound,

    /// Wrong, missing, or expired code. Deliberately indistinguishable.
    #[error("Invalid or expired OTP")]
    InvalidOrExpired,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// The background task running the write sequence failed.
    #[error("internal error: {0}")]
    Internal(String),
}
