//! OTP-gated registration and password reset.
//!
//! A code is issued per `(email, purpose)`; issuing again replaces the
//! previous code. A code verifies at most once, only before it expires,
//! and a wrong guess leaves it in place for another try.
//!
//! Request and verify both finish their writes on a spawned task, so a
//! client that disconnects mid-request cannot leave half-applied state.

mod error;

pub use error::OtpError;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::SecretString;

use smart_print_core::{Email, OtpCode, OtpPurpose};

use crate::db::{CredentialStore, OtpLedger, RepositoryError};
use crate::models::otp::{NewOtp, RegistrationPayload};
use crate::models::user::{NewUser, User, UserChanges};
use crate::services::auth::{AuthError, validate_password};
use crate::services::clock::Clock;
use crate::services::email::{NotificationGateway, generate_otp_code, render_otp_email};

/// Tunables for the flow.
#[derive(Debug, Clone)]
pub struct OtpSettings {
    /// Code lifetime.
    pub ttl: Duration,
    /// Upper bound on one delivery attempt.
    pub delivery_timeout: Duration,
    /// Product name shown in emails.
    pub brand: String,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            delivery_timeout: Duration::from_secs(20),
            brand: "smartPrintGuide".to_owned(),
        }
    }
}

/// Registration details submitted with a registration code request.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct Verified {
    /// The normalized email the code was issued to.
    pub email: Email,
    /// The created (registration) or updated (password reset) account.
    pub user: User,
}

/// Orchestrates code issuance, delivery and verification.
#[derive(Clone)]
pub struct OtpFlow {
    ledger: Arc<dyn OtpLedger>,
    users: Arc<dyn CredentialStore>,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    settings: OtpSettings,
}

impl OtpFlow {
    /// Create a new flow over the given stores and gateway.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn OtpLedger>,
        users: Arc<dyn CredentialStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        settings: OtpSettings,
    ) -> Self {
        Self {
            ledger,
            users,
            gateway,
            clock,
            settings,
        }
    }

    /// Start registration: check the email is free and send a code.
    ///
    /// # Errors
    ///
    /// See [`OtpFlow::request_code`].
    pub async fn request_registration(
        &self,
        email: &str,
        registration: RegistrationRequest,
    ) -> Result<(), OtpError> {
        self.request_code(email, OtpPurpose::Registration, Some(registration))
            .await
    }

    /// Start a password reset: check the account exists and send a code.
    ///
    /// # Errors
    ///
    /// See [`OtpFlow::request_code`].
    pub async fn request_password_reset(&self, email: &str) -> Result<(), OtpError> {
        self.request_code(email, OtpPurpose::PasswordReset, None)
            .await
    }

    /// Issue a fresh code for `(email, purpose)`, replacing any pending one.
    ///
    /// Delivery is attempted before the code is stored. A failed or timed
    /// out delivery is logged and the code is stored anyway, so the caller
    /// always gets the same acknowledgement. The code is never returned.
    ///
    /// # Errors
    ///
    /// - `OtpError::Validation` for a malformed email or, for registration,
    ///   missing fields
    /// - `OtpError::Conflict` if registering an email that already has an account
    /// - `OtpError::NotFound` if resetting the password of an unknown email
    pub async fn request_code(
        &self,
        email: &str,
        purpose: OtpPurpose,
        registration: Option<RegistrationRequest>,
    ) -> Result<(), OtpError> {
        let email = normalize(email)?;

        let payload = match purpose {
            OtpPurpose::Registration => Some(registration_payload(registration)?),
            OtpPurpose::PasswordReset => None,
        };

        let existing = self.users.find_by_email(&email).await?;
        match (purpose, existing) {
            (OtpPurpose::Registration, Some(_)) => {
                tracing::info!(email = %email, "Registration requested for existing account");
                return Err(OtpError::Conflict("User already exists".to_owned()));
            }
            (OtpPurpose::PasswordReset, None) => {
                tracing::info!(email = %email, "Password reset requested for unknown account");
                return Err(OtpError::NotFound);
            }
            _ => {}
        }

        let flow = self.clone();
        tokio::spawn(async move { flow.issue(email, purpose, payload).await })
            .await
            .map_err(|e| OtpError::Internal(e.to_string()))?
    }

    /// Generate, deliver and store a code. Runs detached from the request.
    async fn issue(
        &self,
        email: Email,
        purpose: OtpPurpose,
        payload: Option<RegistrationPayload>,
    ) -> Result<(), OtpError> {
        let code = generate_otp_code();
        self.deliver(&email, purpose, &code).await;

        let created_at = self.clock.now();
        let ttl = TimeDelta::from_std(self.settings.ttl)
            .map_err(|e| OtpError::Internal(format!("invalid ttl: {e}")))?;
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or_else(|| OtpError::Internal("expiry out of range".to_owned()))?;

        self.ledger
            .upsert(NewOtp {
                email: email.clone(),
                purpose,
                code,
                payload,
                created_at,
                expires_at,
            })
            .await?;

        tracing::info!(email = %email, purpose = %purpose, %expires_at, "OTP issued");
        Ok(())
    }

    /// Attempt delivery within the configured timeout. Failures are logged,
    /// never returned.
    async fn deliver(&self, email: &Email, purpose: OtpPurpose, code: &OtpCode) {
        let message = match render_otp_email(
            email,
            purpose,
            code,
            self.settings.ttl,
            &self.settings.brand,
        ) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(email = %email, purpose = %purpose, error = %e, "Failed to render OTP email");
                return;
            }
        };

        match tokio::time::timeout(self.settings.delivery_timeout, self.gateway.send(message)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(email = %email, purpose = %purpose, error = %e, "OTP email delivery failed");
            }
            Err(_) => {
                tracing::error!(
                    email = %email,
                    purpose = %purpose,
                    timeout = ?self.settings.delivery_timeout,
                    "OTP email delivery timed out"
                );
            }
        }
    }

    /// Complete registration with the code sent to `email`.
    ///
    /// # Errors
    ///
    /// See [`OtpFlow::verify_code`].
    pub async fn verify_registration(&self, email: &str, code: &str) -> Result<Verified, OtpError> {
        self.verify_code(email, OtpPurpose::Registration, code, None)
            .await
    }

    /// Set a new password with the code sent to `email`.
    ///
    /// # Errors
    ///
    /// See [`OtpFlow::verify_code`].
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<Verified, OtpError> {
        self.verify_code(
            email,
            OtpPurpose::PasswordReset,
            code,
            Some(new_password.to_owned()),
        )
        .await
    }

    /// Consume the code for `(email, purpose)` and apply its effect.
    ///
    /// Registration creates the account from the stored details; password
    /// reset replaces the password with `new_password`. No session or token
    /// is issued.
    ///
    /// # Errors
    ///
    /// - `OtpError::Validation` for a malformed email, or a missing new
    ///   password on reset (checked before the code is touched)
    /// - `OtpError::InvalidOrExpired` if no live record matches the code
    /// - `OtpError::Conflict` if the email was registered in the meantime
    /// - `OtpError::NotFound` if the account was deleted in the meantime
    pub async fn verify_code(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        new_password: Option<String>,
    ) -> Result<Verified, OtpError> {
        let email = normalize(email)?;

        let new_password = match purpose {
            OtpPurpose::PasswordReset => {
                let password = new_password
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| OtpError::Validation("New password is required".to_owned()))?;
                validate_password(&password).map_err(weak_password)?;
                Some(SecretString::from(password))
            }
            OtpPurpose::Registration => None,
        };

        // A malformed code cannot match anything; report it the same way.
        let Ok(code) = OtpCode::parse(code) else {
            tracing::info!(email = %email, purpose = %purpose, "Malformed OTP submitted");
            return Err(OtpError::InvalidOrExpired);
        };

        let flow = self.clone();
        tokio::spawn(async move { flow.redeem(email, purpose, code, new_password).await })
            .await
            .map_err(|e| OtpError::Internal(e.to_string()))?
    }

    /// Consume the record and apply its effect. Runs detached from the request.
    async fn redeem(
        &self,
        email: Email,
        purpose: OtpPurpose,
        code: OtpCode,
        new_password: Option<SecretString>,
    ) -> Result<Verified, OtpError> {
        let now = self.clock.now();
        let Some(record) = self.ledger.consume(&email, purpose, &code, now).await? else {
            tracing::info!(email = %email, purpose = %purpose, "OTP verification failed");
            return Err(OtpError::InvalidOrExpired);
        };

        let user = match purpose {
            OtpPurpose::Registration => {
                let payload = record.payload.ok_or_else(|| {
                    RepositoryError::DataCorruption("registration OTP without payload".to_owned())
                })?;
                self.register(&email, payload).await?
            }
            OtpPurpose::PasswordReset => {
                let password = new_password
                    .ok_or_else(|| OtpError::Validation("New password is required".to_owned()))?;
                self.replace_password(&email, password).await?
            }
        };

        tracing::info!(email = %email, purpose = %purpose, user_id = %user.id, "OTP verified");
        Ok(Verified { email, user })
    }

    async fn register(&self, email: &Email, payload: RegistrationPayload) -> Result<User, OtpError> {
        // Someone may have registered this email since the code was sent.
        if self.users.find_by_email(email).await?.is_some() {
            return Err(OtpError::Conflict(
                "User already exists with this email".to_owned(),
            ));
        }

        self.users
            .create(NewUser {
                first_name: payload.first_name,
                last_name: payload.last_name,
                email: email.clone(),
                password: SecretString::from(payload.password),
                is_admin: false,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    OtpError::Conflict("User already exists with this email".to_owned())
                }
                other => OtpError::Repository(other),
            })
    }

    async fn replace_password(
        &self,
        email: &Email,
        password: SecretString,
    ) -> Result<User, OtpError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(OtpError::NotFound)?;

        self.users
            .save(user.id, UserChanges::password(password))
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => OtpError::NotFound,
                other => OtpError::Repository(other),
            })
    }
}

fn normalize(email: &str) -> Result<Email, OtpError> {
    Email::normalize(email).map_err(|e| OtpError::Validation(format!("Invalid email: {e}")))
}

fn weak_password(e: AuthError) -> OtpError {
    match e {
        AuthError::WeakPassword(msg) => OtpError::Validation(msg),
        other => OtpError::Validation(other.to_string()),
    }
}

fn registration_payload(
    registration: Option<RegistrationRequest>,
) -> Result<RegistrationPayload, OtpError> {
    let missing = || OtpError::Validation("All fields are required".to_owned());
    let registration = registration.ok_or_else(missing)?;

    let first_name = registration.first_name.trim().to_owned();
    let last_name = registration.last_name.trim().to_owned();
    if first_name.is_empty() || last_name.is_empty() || registration.password.is_empty() {
        return Err(missing());
    }
    validate_password(&registration.password).map_err(weak_password)?;

    Ok(RegistrationPayload {
        first_name,
        last_name,
        password: registration.password,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{MemoryOtpLedger, MemoryUserStore};
    use crate::services::auth::verify_password;
    use crate::services::clock::ManualClock;
    use crate::services::email::RecordingGateway;

    struct Harness {
        flow: OtpFlow,
        ledger: Arc<MemoryOtpLedger>,
        users: Arc<MemoryUserStore>,
        gateway: Arc<RecordingGateway>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(MemoryOtpLedger::new());
        let users = Arc::new(MemoryUserStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let flow = OtpFlow::new(
            ledger.clone(),
            users.clone(),
            gateway.clone(),
            clock.clone(),
            OtpSettings::default(),
        );
        Harness {
            flow,
            ledger,
            users,
            gateway,
            clock,
        }
    }

    fn registration() -> RegistrationRequest {
        RegistrationRequest {
            first_name: "A".to_owned(),
            last_name: "B".to_owned(),
            password: "p1".to_owned(),
        }
    }

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    async fn existing_user(h: &Harness, addr: &str) -> User {
        h.users
            .create(NewUser {
                first_name: "Old".to_owned(),
                last_name: "Name".to_owned(),
                email: email(addr),
                password: SecretString::from("old-password"),
                is_admin: false,
            })
            .await
            .unwrap()
    }

    /// A code guaranteed to differ from `code`.
    fn other_than(code: &OtpCode) -> String {
        let n: u32 = code.as_str().parse().unwrap();
        OtpCode::from_number(n + 1).to_string()
    }

    #[tokio::test]
    async fn test_registration_scenario() {
        let h = harness();
        h.flow
            .request_registration("User@Example.com", registration())
            .await
            .unwrap();

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.as_str(), "user@example.com");
        assert_eq!(sent[0].subject, "Verify Your Account - smartPrintGuide");

        let code = h.gateway.last_code_for(&email("user@example.com")).unwrap();
        let verified = h
            .flow
            .verify_registration("user@example.com", code.as_str())
            .await
            .unwrap();

        assert_eq!(verified.email.as_str(), "user@example.com");
        assert_eq!(verified.user.name, "A B");
        assert!(verify_password("p1", &verified.user.password_hash));
        assert!(h.ledger.is_empty().await);
        assert!(
            h.users
                .find_by_email(&email("user@example.com"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_second_request_supersedes_first() {
        let h = harness();
        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();
        let first = h.gateway.last_code_for(&email("a@b.co")).unwrap();
        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();
        let second = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        assert_eq!(h.ledger.len().await, 1);

        if !first.matches(&second) {
            assert!(matches!(
                h.flow.verify_registration("a@b.co", first.as_str()).await,
                Err(OtpError::InvalidOrExpired)
            ));
        }
        assert!(
            h.flow
                .verify_registration("a@b.co", second.as_str())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_code_verifies_exactly_once() {
        let h = harness();
        existing_user(&h, "a@b.co").await;
        h.flow.request_password_reset("a@b.co").await.unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        h.flow
            .reset_password("a@b.co", code.as_str(), "new-password-1")
            .await
            .unwrap();
        assert!(matches!(
            h.flow
                .reset_password("a@b.co", code.as_str(), "new-password-2")
                .await,
            Err(OtpError::InvalidOrExpired)
        ));

        let user = h.users.find_by_email(&email("a@b.co")).await.unwrap().unwrap();
        assert!(verify_password("new-password-1", &user.password_hash));
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_record() {
        let h = harness();
        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        assert!(matches!(
            h.flow.verify_registration("a@b.co", &other_than(&code)).await,
            Err(OtpError::InvalidOrExpired)
        ));
        assert!(matches!(
            h.flow.verify_registration("a@b.co", "12ab").await,
            Err(OtpError::InvalidOrExpired)
        ));
        assert_eq!(h.ledger.len().await, 1);

        assert!(
            h.flow
                .verify_registration("a@b.co", code.as_str())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_expired_code_fails_and_is_evicted() {
        let h = harness();
        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        h.clock.advance(TimeDelta::minutes(10) + TimeDelta::seconds(1));

        assert!(matches!(
            h.flow.verify_registration("a@b.co", code.as_str()).await,
            Err(OtpError::InvalidOrExpired)
        ));
        assert!(h.ledger.is_empty().await);
        assert!(
            h.users
                .find_by_email(&email("a@b.co"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reset_requests_one_second_apart() {
        let h = harness();
        existing_user(&h, "a@b.co").await;

        h.flow.request_password_reset("a@b.co").await.unwrap();
        let first = h.gateway.last_code_for(&email("a@b.co")).unwrap();
        h.clock.advance(TimeDelta::seconds(1));
        h.flow.request_password_reset("a@b.co").await.unwrap();
        let second = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        assert_eq!(
            h.gateway.sent()[0].subject,
            "Reset Your Password - smartPrintGuide"
        );
        if !first.matches(&second) {
            assert!(matches!(
                h.flow
                    .reset_password("a@b.co", first.as_str(), "new-password-1")
                    .await,
                Err(OtpError::InvalidOrExpired)
            ));
        }
        assert!(
            h.flow
                .reset_password("a@b.co", second.as_str(), "new-password-1")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_request_preconditions() {
        let h = harness();
        existing_user(&h, "taken@b.co").await;

        assert!(matches!(
            h.flow
                .request_registration("taken@b.co", registration())
                .await,
            Err(OtpError::Conflict(_))
        ));
        assert!(matches!(
            h.flow.request_password_reset("ghost@b.co").await,
            Err(OtpError::NotFound)
        ));
        assert!(matches!(
            h.flow.request_password_reset("   ").await,
            Err(OtpError::Validation(_))
        ));
        assert!(matches!(
            h.flow
                .request_registration(
                    "new@b.co",
                    RegistrationRequest {
                        first_name: " ".to_owned(),
                        ..registration()
                    },
                )
                .await,
            Err(OtpError::Validation(_))
        ));
        assert!(h.gateway.sent().is_empty());
        assert!(h.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delivery_failure_still_stores_code() {
        let h = harness();
        h.gateway.set_failing(true);

        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();

        assert!(h.gateway.sent().is_empty());
        let record = h
            .ledger
            .find_live(&email("a@b.co"), OtpPurpose::Registration, h.clock.now())
            .await
            .unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn test_reset_without_password_does_not_burn_code() {
        let h = harness();
        existing_user(&h, "a@b.co").await;
        h.flow.request_password_reset("a@b.co").await.unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        assert!(matches!(
            h.flow.reset_password("a@b.co", code.as_str(), "").await,
            Err(OtpError::Validation(_))
        ));
        assert_eq!(h.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_registration_race_reports_conflict() {
        let h = harness();
        h.flow
            .request_registration("a@b.co", registration())
            .await
            .unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        existing_user(&h, "a@b.co").await;

        assert!(matches!(
            h.flow.verify_registration("a@b.co", code.as_str()).await,
            Err(OtpError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_registration_and_reset_codes_are_independent() {
        let h = harness();
        existing_user(&h, "a@b.co").await;
        h.flow.request_password_reset("a@b.co").await.unwrap();
        let reset_code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        assert!(matches!(
            h.flow
                .verify_registration("a@b.co", reset_code.as_str())
                .await,
            Err(OtpError::InvalidOrExpired)
        ));
        assert_eq!(h.ledger.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_resets_with_one_code_succeed_once() {
        let h = harness();
        existing_user(&h, "a@b.co").await;
        h.flow.request_password_reset("a@b.co").await.unwrap();
        let code = h.gateway.last_code_for(&email("a@b.co")).unwrap();

        let (first, second) = tokio::join!(
            h.flow.reset_password("a@b.co", code.as_str(), "first-password"),
            h.flow.reset_password("a@b.co", code.as_str(), "second-password"),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(OtpError::InvalidOrExpired)))
                .count(),
            1
        );
        assert!(h.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_registration_accepts_short_password() {
        let h = harness();
        h.flow
            .request_registration(
                "User@Example.com",
                RegistrationRequest {
                    first_name: "A".to_owned(),
                    last_name: "B".to_owned(),
                    password: "p1".to_owned(),
                },
            )
            .await
            .unwrap();

        assert_eq!(h.ledger.len().await, 1);
        assert!(matches!(
            h.flow
                .request_registration(
                    "other@example.com",
                    RegistrationRequest {
                        password: String::new(),
                        ..registration()
                    },
                )
                .await,
            Err(OtpError::Validation(_))
        ));
    }
}
