//! Smart Print API - OTP registration, password reset and payments.
//!
//! This binary serves the JSON API on port 5000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON request and response bodies
//! - `PostgreSQL` for accounts, pending one-time codes, orders and sessions
//! - SMTP (lettre) for OTP emails, or a log-only gateway in development
//! - Background sweep purging expired one-time codes
//!
//! # Security
//!
//! - Passwords hashed with argon2id
//! - One-time codes are never returned in responses or logged (outside dev mode)
//! - Payment callbacks verified with HMAC-SHA256 in constant time

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use sentry::integrations::tracing as sentry_tracing;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_print_api::config::ApiConfig;
use smart_print_api::services::email::{LogOnlyGateway, NotificationGateway, SmtpGateway};
use smart_print_api::state::AppState;
use smart_print_api::{app, db, middleware};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ApiConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Pick SMTP when configured, otherwise log emails instead of sending them.
fn notification_gateway(config: &ApiConfig) -> Arc<dyn NotificationGateway> {
    match &config.email.smtp {
        Some(smtp) => match SmtpGateway::new(&config.email, smtp) {
            Ok(gateway) => {
                tracing::info!(host = %smtp.host, port = smtp.port, "SMTP gateway configured");
                Arc::new(gateway)
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid SMTP configuration, falling back to log-only email");
                Arc::new(LogOnlyGateway)
            }
        },
        None => {
            tracing::warn!("SMTP_HOST not set, OTP emails will be logged instead of sent");
            Arc::new(LogOnlyGateway)
        }
    }
}

/// Allow credentialed JSON requests from the configured public origin.
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(config.base_url.trim_end_matches('/')) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "API_BASE_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ApiConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Initialize tracing with EnvFilter and Sentry integration
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "smart_print_api=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Initialize database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p smart-print-cli -- migrate

    let gateway = notification_gateway(&config);
    let state = AppState::new(&config, pool.clone(), gateway);

    // Purge expired codes in the background
    let sweeper = state.sweeper().spawn();
    tracing::info!(interval = ?config.otp.sweep_interval, "OTP sweeper started");

    // Create session layer
    let session_layer = middleware::create_session_layer(&pool, &config);

    // Build router
    let router = app(state, session_layer)
        .layer(cors_layer(&config))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    // Start server
    let addr = config.socket_addr();
    tracing::info!("api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    sweeper.shutdown().await;
    tracing::info!("OTP sweeper stopped");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
