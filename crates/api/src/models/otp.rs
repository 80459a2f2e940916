//! One-time code ledger types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use smart_print_core::{Email, OtpCode, OtpPurpose, OtpRecordId};

/// Account details held back until a registration code is verified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl std::fmt::Debug for RegistrationPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationPayload")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A pending code in the ledger. At most one exists per `(email, purpose)`.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub id: OtpRecordId,
    pub email: Email,
    pub purpose: OtpPurpose,
    pub code: OtpCode,
    /// Present only for [`OtpPurpose::Registration`].
    pub payload: Option<RegistrationPayload>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpRecord {
    /// A record is live strictly before its expiry instant.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A code about to be written to the ledger.
#[derive(Debug, Clone)]
pub struct NewOtp {
    pub email: Email,
    pub purpose: OtpPurpose,
    pub code: OtpCode,
    pub payload: Option<RegistrationPayload>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
