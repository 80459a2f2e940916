//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::{
    CredentialStore, OrderStore, OtpLedger, PgOrderStore, PgOtpLedger, PgUserStore,
};
use crate::services::auth::AuthService;
use crate::services::clock::{Clock, SystemClock};
use crate::services::email::NotificationGateway;
use crate::services::otp::{OtpFlow, OtpSettings};
use crate::services::payment::PaymentVerifier;
use crate::services::sweep::OtpSweeper;

/// The storage and delivery backends the services run on.
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn CredentialStore>,
    pub ledger: Arc<dyn OtpLedger>,
    pub orders: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn NotificationGateway>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// `PostgreSQL`-backed stores on the wall clock.
    #[must_use]
    pub fn postgres(pool: &PgPool, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            ledger: Arc::new(PgOtpLedger::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            gateway,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Settings the services need from configuration.
#[derive(Debug, Clone)]
pub struct StateSettings {
    pub otp: OtpSettings,
    pub sweep_interval: std::time::Duration,
    pub payment_key: SecretString,
    /// Apply per-IP rate limits to the login and OTP routes.
    pub rate_limit: bool,
}

impl StateSettings {
    /// Derive settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            otp: OtpSettings {
                ttl: config.otp.ttl,
                delivery_timeout: config.email.timeout,
                brand: config.email.from_name.clone(),
            },
            sweep_interval: config.otp.sweep_interval,
            payment_key: config.razorpay.key_secret.clone(),
            rate_limit: true,
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the services and the optional database pool.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    backends: Backends,
    settings: StateSettings,
    auth: AuthService,
    otp: OtpFlow,
    payment: PaymentVerifier,
}

impl AppState {
    /// Create state backed by `PostgreSQL`.
    #[must_use]
    pub fn new(config: &ApiConfig, pool: PgPool, gateway: Arc<dyn NotificationGateway>) -> Self {
        let backends = Backends::postgres(&pool, gateway);
        Self::build(Some(pool), backends, StateSettings::from_config(config))
    }

    /// Create state over arbitrary backends, without a database pool.
    #[must_use]
    pub fn with_backends(backends: Backends, settings: StateSettings) -> Self {
        Self::build(None, backends, settings)
    }

    fn build(pool: Option<PgPool>, backends: Backends, settings: StateSettings) -> Self {
        let auth = AuthService::new(backends.users.clone());
        let otp = OtpFlow::new(
            backends.ledger.clone(),
            backends.users.clone(),
            backends.gateway.clone(),
            backends.clock.clone(),
            settings.otp.clone(),
        );
        let payment = PaymentVerifier::new(
            backends.orders.clone(),
            settings.payment_key.clone(),
            backends.clock.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                pool,
                backends,
                settings,
                auth,
                otp,
                payment,
            }),
        }
    }

    /// Get a reference to the database connection pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Get the service settings.
    #[must_use]
    pub fn settings(&self) -> &StateSettings {
        &self.inner.settings
    }

    /// Get the authentication service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    /// Get the OTP flow.
    #[must_use]
    pub fn otp(&self) -> &OtpFlow {
        &self.inner.otp
    }

    /// Get the payment verifier.
    #[must_use]
    pub fn payment(&self) -> &PaymentVerifier {
        &self.inner.payment
    }

    /// Get the order store.
    #[must_use]
    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.inner.backends.orders
    }

    /// Get the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.backends.clock
    }

    /// Build the expired-code sweeper over this state's ledger.
    #[must_use]
    pub fn sweeper(&self) -> OtpSweeper {
        OtpSweeper::new(
            self.inner.backends.ledger.clone(),
            self.inner.backends.clock.clone(),
            self.inner.settings.sweep_interval,
        )
    }
}
