//! OTP ledger: pending one-time codes keyed by `(email, purpose)`.
//!
//! Expiry is enforced three ways: every read filters on `expires_at`,
//! expired rows met during a lookup are deleted, and the background sweep
//! purges whatever is left.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use smart_print_core::{Email, OtpCode, OtpPurpose, OtpRecordId};

use super::RepositoryError;
use crate::models::otp::{NewOtp, OtpRecord, RegistrationPayload};

/// Storage for pending codes.
///
/// All methods take `now` explicitly so callers control the clock.
#[async_trait]
pub trait OtpLedger: Send + Sync {
    /// Insert a code, replacing any existing record for the same key.
    async fn upsert(&self, otp: NewOtp) -> Result<OtpRecord, RepositoryError>;

    /// The live record for a key, if any. An expired record is deleted
    /// and reported as absent.
    async fn find_live(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError>;

    /// Atomically remove and return the record iff it is live and `code`
    /// matches. A mismatch leaves the record in place; an expired record is
    /// deleted. Two concurrent calls can never both receive the record.
    async fn consume(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        code: &OtpCode,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError>;

    /// Delete a record by id. Returns whether a row was removed; an
    /// already-absent record is not an error.
    async fn delete_if_present(&self, id: OtpRecordId) -> Result<bool, RepositoryError>;

    /// Delete every record whose expiry is at or before `now`.
    async fn delete_all_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

const OTP_COLUMNS: &str = "id, email, purpose, code, payload, created_at, expires_at";

/// Internal row type for `PostgreSQL` OTP queries.
#[derive(Debug, sqlx::FromRow)]
struct OtpRow {
    id: i32,
    email: String,
    purpose: OtpPurpose,
    code: String,
    payload: Option<Json<RegistrationPayload>>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<OtpRow> for OtpRecord {
    type Error = RepositoryError;

    fn try_from(row: OtpRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let code = OtpCode::parse(&row.code).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid otp code in database: {e}"))
        })?;

        Ok(Self {
            id: OtpRecordId::new(row.id),
            email,
            purpose: row.purpose,
            code,
            payload: row.payload.map(|Json(p)| p),
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// `PostgreSQL`-backed [`OtpLedger`].
///
/// Relies on the unique index on `(email, purpose)` for upserts and on
/// `DELETE .. RETURNING` for atomic consumption.
#[derive(Debug, Clone)]
pub struct PgOtpLedger {
    pool: PgPool,
}

impl PgOtpLedger {
    /// Create a new ledger.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpLedger for PgOtpLedger {
    async fn upsert(&self, otp: NewOtp) -> Result<OtpRecord, RepositoryError> {
        let row = sqlx::query_as::<_, OtpRow>(&format!(
            r"
            INSERT INTO otp_codes (email, purpose, code, payload, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email, purpose) DO UPDATE SET
                code = EXCLUDED.code,
                payload = EXCLUDED.payload,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            RETURNING {OTP_COLUMNS}
            "
        ))
        .bind(otp.email.as_str())
        .bind(otp.purpose)
        .bind(otp.code.as_str())
        .bind(otp.payload.map(Json))
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_live(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, OtpRow>(&format!(
            "SELECT {OTP_COLUMNS} FROM otp_codes WHERE email = $1 AND purpose = $2"
        ))
        .bind(email.as_str())
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = row.map(OtpRecord::try_from).transpose()? else {
            return Ok(None);
        };

        if record.is_live(now) {
            return Ok(Some(record));
        }

        self.delete_if_present(record.id).await?;
        Ok(None)
    }

    async fn consume(
        &self,
        email: &Email,
        purpose: OtpPurpose,
        code: &OtpCode,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, RepositoryError> {
        // Both statements see the same snapshot and touch disjoint rows
        // (expired vs live), so the expired purge never races the consume.
        let row = sqlx::query_as::<_, OtpRow>(&format!(
            r"
            WITH expired AS (
                DELETE FROM otp_codes
                WHERE email = $1 AND purpose = $2 AND expires_at <= $4
            )
            DELETE FROM otp_codes
            WHERE email = $1 AND purpose = $2 AND code = $3 AND expires_at > $4
            RETURNING {OTP_COLUMNS}
            "
        ))
        .bind(email.as_str())
        .bind(purpose)
        .bind(code.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn delete_if_present(&self, id: OtpRecordId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
