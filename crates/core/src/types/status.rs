//! Status and purpose enums for various entities.

use serde::{Deserialize, Serialize};

/// What a one-time code is allowed to authorize.
///
/// Each purpose has its own ledger slot per email, so a pending
/// registration code and a pending reset code never interfere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "otp_purpose", rename_all = "snake_case")
)]
#[serde(rename_all = "kebab-case")]
pub enum OtpPurpose {
    /// Confirms a new account's email before the account exists.
    Registration,
    /// Authorizes setting a new password on an existing account.
    PasswordReset,
}

impl OtpPurpose {
    /// Email subject line for this purpose, before the brand suffix.
    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::Registration => "Verify Your Account",
            Self::PasswordReset => "Reset Your Password",
        }
    }

    /// Short heading shown in the email banner.
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Registration => "Account Verification",
            Self::PasswordReset => "Password Reset",
        }
    }

    /// The action the code completes, phrased for "Please use it to ...".
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Registration => "verify your account",
            Self::PasswordReset => "reset your password",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => write!(f, "registration"),
            Self::PasswordReset => write!(f, "password-reset"),
        }
    }
}

impl std::str::FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "password-reset" | "password_reset" | "reset" => Ok(Self::PasswordReset),
            _ => Err(format!("invalid otp purpose: {s}")),
        }
    }
}

/// Status string recorded on an order's payment result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Signature verified by the provider integration.
    Paid,
}

impl PaymentStatus {
    /// Wire representation stored in `payment_result.status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
        }
    }
}
