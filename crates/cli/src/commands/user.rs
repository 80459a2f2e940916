//! User account seeding.
//!
//! # Usage
//!
//! ```bash
//! sp-cli user create -e admin@example.com -f Site -l Admin -p 'correct horse' --admin
//! ```
//!
//! Running the command for an email that already has an account replaces
//! that account's password and leaves everything else alone.

use secrecy::SecretString;

use smart_print_api::db::{CredentialStore, PgUserStore};
use smart_print_api::models::user::{NewUser, UserChanges};
use smart_print_api::services::auth::validate_password;
use smart_print_core::Email;

use super::{CommandError, connect};

/// Account details for `user create`.
pub struct SeedUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub is_admin: bool,
}

/// Create the account, or reset its password if it exists.
///
/// # Returns
///
/// The ID of the created or updated user.
///
/// # Errors
///
/// Returns an error for an invalid email or weak password, or if the
/// database operation fails.
pub async fn create(seed: SeedUser) -> Result<i32, CommandError> {
    let email =
        Email::normalize(&seed.email).map_err(|e| CommandError::Invalid(e.to_string()))?;
    validate_password(&seed.password).map_err(|e| CommandError::Invalid(e.to_string()))?;
    if seed.first_name.trim().is_empty() || seed.last_name.trim().is_empty() {
        return Err(CommandError::Invalid(
            "first and last name are required".to_owned(),
        ));
    }

    let pool = connect().await?;
    let users = PgUserStore::new(pool);

    let password = SecretString::from(seed.password);

    if let Some(existing) = users.find_by_email(&email).await? {
        let user = users
            .save(existing.id, UserChanges::password(password))
            .await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Password replaced for existing account");
        return Ok(user.id.as_i32());
    }

    let user = users
        .create(NewUser {
            first_name: seed.first_name.trim().to_owned(),
            last_name: seed.last_name.trim().to_owned(),
            email,
            password,
            is_admin: seed.is_admin,
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        admin = user.is_admin,
        "User created successfully"
    );
    Ok(user.id.as_i32())
}
