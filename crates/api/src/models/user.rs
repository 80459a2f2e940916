//! User domain types.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

use smart_print_core::{Email, UserId};

/// A registered account (domain type).
///
/// `password_hash` is an argon2id PHC string. It is never serialized and
/// `Debug` redacts it.
#[derive(Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Display name, always `"{first_name} {last_name}"`.
    pub name: String,
    /// Normalized (trimmed, lower-cased) email address.
    pub email: Email,
    /// Argon2id hash of the password.
    pub password_hash: String,
    /// Administrator flag.
    pub is_admin: bool,
    /// Blocked accounts cannot log in.
    pub is_blocked: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Join first and last name into the display name.
    #[must_use]
    pub fn display_name(first_name: &str, last_name: &str) -> String {
        format!("{first_name} {last_name}")
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("is_admin", &self.is_admin)
            .field("is_blocked", &self.is_blocked)
            .finish_non_exhaustive()
    }
}

/// Fields required to create a user. The store hashes `password`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: Email,
    pub password: SecretString,
    pub is_admin: bool,
}

/// A partial update to a user.
///
/// `None` leaves a field untouched. The display name is recomputed when
/// either name part changes, and the password is re-hashed only when
/// `password` is `Some`.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Email>,
    pub password: Option<SecretString>,
}

impl UserChanges {
    /// A change that only replaces the password.
    #[must_use]
    pub fn password(password: SecretString) -> Self {
        Self {
            password: Some(password),
            ..Self::default()
        }
    }

    /// Returns true if nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password.is_none()
    }
}

/// Paging and search parameters for listing users.
#[derive(Debug, Clone)]
pub struct UserQuery {
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Case-insensitive substring matched against names and email.
    pub search: Option<String>,
}

impl UserQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest page size a caller may request.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a query, clamping page and limit to sane bounds.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>, search: Option<String>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(Self::DEFAULT_LIMIT)
                .min(Self::MAX_LIMIT),
            search: search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
        }
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// One page of users plus totals.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

impl UserPage {
    /// Assemble a page, computing the page count from `total`.
    #[must_use]
    pub fn new(users: Vec<User>, query: &UserQuery, total: u64) -> Self {
        Self {
            users,
            page: query.page,
            pages: total.div_ceil(u64::from(query.limit)),
            total,
        }
    }
}

/// Public view of a user, as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: Email,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            is_blocked: user.is_blocked,
            created_at: user.created_at,
        }
    }
}
