//! Notification gateway for one-time codes.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. When SMTP
//! is not configured, [`LogOnlyGateway`] logs messages instead of sending them.

use std::sync::Mutex;
use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use smart_print_core::{Email, OtpCode, OtpPurpose};

use crate::config::{EmailConfig, SmtpConfig};

/// HTML template for a one-time code email.
#[derive(Template)]
#[template(path = "email/otp.html")]
struct OtpEmailHtml<'a> {
    brand: &'a str,
    heading: &'a str,
    intro: &'a str,
    code: &'a str,
    ttl_minutes: u64,
    action: &'a str,
}

/// Plain text template for a one-time code email.
#[derive(Template)]
#[template(path = "email/otp.txt")]
struct OtpEmailText<'a> {
    brand: &'a str,
    heading: &'a str,
    intro: &'a str,
    code: &'a str,
    ttl_minutes: u64,
    action: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The attempt did not finish in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway refused the message.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// A fully rendered message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Email,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// Overrides the configured sender display name.
    pub from_display_name: Option<String>,
    pub reply_to: Option<String>,
}

/// Something that can deliver an email.
///
/// Implementations may fail transiently; callers bound each attempt with
/// a timeout.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver one message.
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError>;
}

/// Render the email carrying `code` for `purpose`.
///
/// # Errors
///
/// Returns `DeliveryError::Template` if a template fails to render.
pub fn render_otp_email(
    to: &Email,
    purpose: OtpPurpose,
    code: &OtpCode,
    ttl: Duration,
    brand: &str,
) -> Result<OutgoingEmail, DeliveryError> {
    let intro = match purpose {
        OtpPurpose::Registration => format!("Thank you for registering with {brand}."),
        OtpPurpose::PasswordReset => "We received a request to reset your password.".to_owned(),
    };
    let ttl_minutes = ttl.as_secs().div_ceil(60);

    let html = OtpEmailHtml {
        brand,
        heading: purpose.heading(),
        intro: &intro,
        code: code.as_str(),
        ttl_minutes,
        action: purpose.action(),
    }
    .render()?;
    let text = OtpEmailText {
        brand,
        heading: purpose.heading(),
        intro: &intro,
        code: code.as_str(),
        ttl_minutes,
        action: purpose.action(),
    }
    .render()?;

    Ok(OutgoingEmail {
        to: to.clone(),
        subject: format!("{} - {brand}", purpose.subject()),
        html_body: html,
        text_body: text,
        from_display_name: None,
        reply_to: None,
    })
}

/// Generate a one-time code drawn uniformly from `000000..=999999`.
#[must_use]
pub fn generate_otp_code() -> OtpCode {
    use rand::Rng;
    OtpCode::from_number(rand::rng().random_range(0..OtpCode::SPACE))
}

// =============================================================================
// SMTP
// =============================================================================

/// Delivers email through an SMTP relay.
///
/// The transport pools connections and is built once at startup.
#[derive(Clone)]
pub struct SmtpGateway {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    from_name: String,
}

impl SmtpGateway {
    /// Create a new gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host is invalid or the sender address
    /// does not parse.
    pub fn new(email: &EmailConfig, smtp: &SmtpConfig) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
            .port(smtp.port)
            .timeout(Some(email.timeout));

        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        email
            .from_address
            .parse::<lettre::Address>()
            .map_err(|_| DeliveryError::InvalidAddress(email.from_address.clone()))?;

        Ok(Self {
            mailer: builder.build(),
            from_address: email.from_address.clone(),
            from_name: email.from_name.clone(),
        })
    }

    fn sender(&self, display_name: Option<&str>) -> Result<Mailbox, DeliveryError> {
        let address = self
            .from_address
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(self.from_address.clone()))?;
        Ok(Mailbox::new(
            Some(display_name.unwrap_or(&self.from_name).to_owned()),
            address,
        ))
    }
}

#[async_trait]
impl NotificationGateway for SmtpGateway {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        let to: Mailbox = email
            .to
            .as_str()
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(email.to.to_string()))?;

        let mut builder = Message::builder()
            .from(self.sender(email.from_display_name.as_deref())?)
            .to(to)
            .subject(&email.subject);

        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(
                reply_to
                    .parse()
                    .map_err(|_| DeliveryError::InvalidAddress(reply_to.clone()))?,
            );
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html_body),
                ),
        )?;

        self.mailer.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

// =============================================================================
// Development and test gateways
// =============================================================================

/// Logs messages instead of sending them. Used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyGateway;

#[async_trait]
impl NotificationGateway for LogOnlyGateway {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            body = %email.text_body,
            "SMTP not configured, email logged instead of sent (dev mode)"
        );
        Ok(())
    }
}

/// Keeps every message it is asked to send.
///
/// Can be switched into a failing mode to exercise delivery-failure paths.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingGateway {
    /// Create a gateway that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// All messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// The most recent code sent to `to`, read back from the text body.
    #[must_use]
    pub fn last_code_for(&self, to: &Email) -> Option<OtpCode> {
        self.sent()
            .iter()
            .rev()
            .find(|m| &m.to == to)
            .and_then(|m| extract_code(&m.text_body))
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("recording gateway set to fail".to_owned()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

/// Find the first standalone run of six digits in a rendered body.
fn extract_code(body: &str) -> Option<OtpCode> {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == OtpCode::LENGTH)
        .and_then(|run| OtpCode::parse(run).ok())
}
