//! Payment provider callback verification.
//!
//! The provider signs `"{order_ref}|{payment_ref}"` with the shared key
//! using HMAC-SHA256 and sends the lowercase hex digest. Only a matching
//! signature may mark an order paid.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

use smart_print_core::OrderId;

use crate::db::{OrderStore, RepositoryError};
use crate::models::order::{Order, PaymentResult};
use crate::services::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Errors from payment verification.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The signature did not match. Nothing was written.
    #[error("Invalid signature sent!")]
    InvalidSignature,

    /// The signature matched but the order does not exist.
    #[error("Order not found")]
    OrderNotFound,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Provider callback fields.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    /// Provider order reference.
    pub order_ref: String,
    /// Provider payment reference.
    pub payment_ref: String,
    /// Hex-encoded signature.
    pub signature: String,
    /// Local order to mark paid.
    pub order_id: OrderId,
    /// Payer email recorded on the payment result.
    pub payer_email: String,
}

/// Verifies provider signatures and records payments.
#[derive(Clone)]
pub struct PaymentVerifier {
    orders: Arc<dyn OrderStore>,
    key: SecretString,
    clock: Arc<dyn Clock>,
}

impl PaymentVerifier {
    /// Create a verifier using the provider's shared key.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, key: SecretString, clock: Arc<dyn Clock>) -> Self {
        Self { orders, key, clock }
    }

    /// Check the callback signature and, if it matches, mark the order paid.
    ///
    /// The paid state is overwritten, so replaying a valid callback leaves
    /// the order paid with the same references.
    ///
    /// # Errors
    ///
    /// - `PaymentError::InvalidSignature` if the signature is malformed or
    ///   does not match; the order store is not touched
    /// - `PaymentError::OrderNotFound` if the order does not exist
    pub async fn verify_payment(&self, callback: PaymentCallback) -> Result<Order, PaymentError> {
        if !self.signature_matches(&callback.order_ref, &callback.payment_ref, &callback.signature)
        {
            tracing::warn!(
                order_ref = %callback.order_ref,
                payment_ref = %callback.payment_ref,
                order_id = %callback.order_id,
                received = %fingerprint(&callback.signature),
                "Payment signature mismatch"
            );
            return Err(PaymentError::InvalidSignature);
        }

        let result = PaymentResult::paid(
            &callback.payment_ref,
            &callback.payer_email,
            self.clock.now(),
        );

        let order = self
            .orders
            .save_payment(callback.order_id, result)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => PaymentError::OrderNotFound,
                other => PaymentError::Repository(other),
            })?;

        tracing::info!(
            order_id = %order.id,
            payment_ref = %callback.payment_ref,
            "Payment verified"
        );
        Ok(order)
    }

    /// Constant-time comparison of `signature` against the expected digest.
    fn signature_matches(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()) else {
            return false;
        };
        mac.update(signing_input(order_ref, payment_ref).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

/// The message the provider signs.
fn signing_input(order_ref: &str, payment_ref: &str) -> String {
    format!("{order_ref}|{payment_ref}")
}

/// Hex HMAC-SHA256 of `order_ref|payment_ref` under `key`.
///
/// # Errors
///
/// Never fails in practice; HMAC accepts keys of any length.
pub fn expected_signature(
    key: &SecretString,
    order_ref: &str,
    payment_ref: &str,
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key.expose_secret().as_bytes())?;
    mac.update(signing_input(order_ref, payment_ref).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Short digest of a received signature, safe to log.
fn fingerprint(signature: &str) -> String {
    let digest = Sha256::digest(signature.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}
