//! One-time verification code type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`OtpCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpCodeError {
    /// The input does not have exactly [`OtpCode::LENGTH`] characters.
    #[error("code must be exactly {expected} digits")]
    WrongLength {
        /// Required number of digits.
        expected: usize,
    },
    /// The input contains a non-digit character.
    #[error("code must contain only digits")]
    NonDigit,
}

/// A fixed-width numeric one-time code.
///
/// Codes are compared textually, so leading zeros are significant:
/// `"004217"` and `"4217"` are different codes, and only the former is valid.
///
/// ```
/// use smart_print_core::OtpCode;
///
/// assert!(OtpCode::parse("004217").is_ok());
/// assert!(OtpCode::parse("4217").is_err());
/// assert_eq!(OtpCode::from_number(4217).as_str(), "004217");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(transparent)]
pub struct OtpCode(String);

impl OtpCode {
    /// Number of digits in every code.
    pub const LENGTH: usize = 6;

    /// Number of distinct codes (`000000` through `999999`).
    pub const SPACE: u32 = 1_000_000;

    /// Parse a submitted code. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is not exactly six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, OtpCodeError> {
        let s = s.trim();
        if s.len() != Self::LENGTH {
            return Err(OtpCodeError::WrongLength {
                expected: Self::LENGTH,
            });
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OtpCodeError::NonDigit);
        }
        Ok(Self(s.to_owned()))
    }

    /// Build a code from a number in `0..SPACE`, zero-padded to six digits.
    ///
    /// Values outside the code space are reduced modulo [`OtpCode::SPACE`].
    #[must_use]
    pub fn from_number(n: u32) -> Self {
        Self(format!("{:06}", n % Self::SPACE))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality against another code.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

// Codes are credentials; keep them out of debug output.
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}

impl fmt::Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OtpCode {
    type Err = OtpCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
