//! Authentication and account management.
//!
//! Password login with strict separation between the customer and admin
//! logins, profile updates, and the admin-only user operations.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::SecretString;

use smart_print_core::{Email, UserId};

use crate::db::{CredentialStore, RepositoryError};
use crate::models::user::{User, UserChanges, UserPage, UserQuery};

/// Minimum password length. Any non-empty password is accepted.
pub const MIN_PASSWORD_LENGTH: usize = 1;

/// Requested profile changes. Empty strings count as "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(users: Arc<dyn CredentialStore>) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Login with email and password.
    ///
    /// `admin_login` selects the admin door: administrators may only use it
    /// and customers may never use it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong,
    /// `AuthError::Blocked` for blocked accounts, and `AuthError::WrongRole`
    /// when the account does not match the login door.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        admin_login: bool,
    ) -> Result<User, AuthError> {
        let Ok(email) = Email::normalize(email) else {
            return Err(AuthError::InvalidCredentials);
        };

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if user.is_blocked {
            return Err(AuthError::Blocked);
        }

        if !admin_login && user.is_admin {
            return Err(AuthError::WrongRole("You are not our user"));
        }
        if admin_login && !user.is_admin {
            return Err(AuthError::WrongRole("Not authorized as an admin"));
        }

        tracing::info!(user_id = %user.id, admin = user.is_admin, "User logged in");
        Ok(user)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Apply a profile update.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::WeakPassword` for bad
    /// input, `AuthError::UserAlreadyExists` if the new email is taken.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        let email = non_empty(update.email)
            .map(|e| Email::normalize(&e))
            .transpose()?;
        let password = update
            .password
            .filter(|p| !p.is_empty())
            .map(|p| validate_password(&p).map(|()| SecretString::from(p)))
            .transpose()?;

        let changes = UserChanges {
            first_name: non_empty(update.first_name),
            last_name: non_empty(update.last_name),
            email,
            password,
        };

        self.users
            .save(user_id, changes)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    // =========================================================================
    // Admin user management
    // =========================================================================

    /// Page through users.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the query fails.
    pub async fn list_users(&self, query: &UserQuery) -> Result<UserPage, AuthError> {
        Ok(self.users.list(query).await?)
    }

    /// Remove a customer account. Administrator accounts cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` or `AuthError::AdminProtected`.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let user = self.get_user(user_id).await?;
        if user.is_admin {
            return Err(AuthError::AdminProtected("Cannot delete admin user"));
        }

        self.users.delete(user_id).await.map_err(not_found)?;
        tracing::info!(user_id = %user_id, "User removed");
        Ok(())
    }

    /// Block a customer account. Administrator accounts cannot be blocked.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` or `AuthError::AdminProtected`.
    pub async fn block_user(&self, user_id: UserId) -> Result<User, AuthError> {
        let user = self.get_user(user_id).await?;
        if user.is_admin {
            return Err(AuthError::AdminProtected("Cannot block admin user"));
        }

        let user = self.users.set_blocked(user_id, true).await.map_err(not_found)?;
        tracing::info!(user_id = %user_id, "User blocked");
        Ok(user)
    }

    /// Clear the block flag.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn unblock_user(&self, user_id: UserId) -> Result<User, AuthError> {
        let user = self
            .users
            .set_blocked(user_id, false)
            .await
            .map_err(not_found)?;
        tracing::info!(user_id = %user_id, "User unblocked");
        Ok(user)
    }
}

fn not_found(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::NotFound => AuthError::UserNotFound,
        other => AuthError::Repository(other),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is empty.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword("Password is required".to_owned()));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns an error if the hasher rejects the input.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Verify a password against a stored hash.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
