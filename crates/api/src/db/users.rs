//! Credential store: user accounts and their password hashes.
//!
//! Passwords arrive as plaintext and are hashed here, on write, so no
//! caller can persist an unhashed password by accident.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;

use smart_print_core::{Email, UserId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::user::{NewUser, User, UserChanges, UserPage, UserQuery};
use crate::services::auth::hash_password;

/// Account persistence.
///
/// Implementations enforce email uniqueness and hash passwords on write.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an account by normalized email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Look up an account by id.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Create an account, hashing `new_user.password`.
    ///
    /// Fails with [`RepositoryError::Conflict`] if the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError>;

    /// Apply `changes` to an account. The password is re-hashed only when
    /// `changes.password` is set.
    async fn save(&self, id: UserId, changes: UserChanges) -> Result<User, RepositoryError>;

    /// Page through accounts, newest first.
    async fn list(&self, query: &UserQuery) -> Result<UserPage, RepositoryError>;

    /// Hard-delete an account.
    async fn delete(&self, id: UserId) -> Result<(), RepositoryError>;

    /// Set or clear the block flag.
    async fn set_blocked(&self, id: UserId, blocked: bool) -> Result<User, RepositoryError>;
}

/// Hash a plaintext password for storage.
pub(crate) fn hash_for_storage(password: &secrecy::SecretString) -> Result<String, RepositoryError> {
    hash_password(password.expose_secret()).map_err(|_| RepositoryError::PasswordHash)
}

/// Escape `LIKE` metacharacters and wrap in wildcards.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// =============================================================================
// Internal Row Types
// =============================================================================

const USER_COLUMNS: &str = "id, first_name, last_name, name, email, password_hash, \
                            is_admin, is_blocked, created_at, updated_at";

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    first_name: String,
    last_name: String,
    name: String,
    email: String,
    password_hash: String,
    is_admin: bool,
    is_blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            name: row.name,
            email,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// `PostgreSQL`-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgUserStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let password_hash = hash_for_storage(&new_user.password)?;
        let name = User::display_name(&new_user.first_name, &new_user.last_name);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO users (first_name, last_name, name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&name)
        .bind(new_user.email.as_str())
        .bind(&password_hash)
        .bind(new_user.is_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        row.try_into()
    }

    async fn save(&self, id: UserId, changes: UserChanges) -> Result<User, RepositoryError> {
        let password_hash = changes
            .password
            .as_ref()
            .map(hash_for_storage)
            .transpose()?;

        // SET expressions see the pre-update row, so `name` is rebuilt from
        // whichever name parts end up stored.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                name = COALESCE($2, first_name) || ' ' || COALESCE($3, last_name),
                email = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(changes.first_name.as_deref())
        .bind(changes.last_name.as_deref())
        .bind(changes.email.as_ref().map(Email::as_str))
        .bind(password_hash.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn list(&self, query: &UserQuery) -> Result<UserPage, RepositoryError> {
        let pattern = query.search.as_deref().map(like_pattern);
        let filter = r"
            $1::text IS NULL
            OR name ILIKE $1 OR email ILIKE $1
            OR first_name ILIKE $1 OR last_name ILIKE $1
        ";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r"
            SELECT {USER_COLUMNS} FROM users
            WHERE {filter}
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(pattern.as_deref())
        .bind(i64::from(query.limit))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<User>, _>>()?;

        Ok(UserPage::new(
            users,
            query,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_blocked(&self, id: UserId, blocked: bool) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE users SET is_blocked = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(blocked)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}
