//! Authentication route handlers.
//!
//! Password login and logout, OTP-gated registration and password reset,
//! and the profile endpoints. All bodies are JSON with camelCase fields.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::session::keys;
use crate::models::user::UserProfile;
use crate::models::CurrentUser;
use crate::services::auth::ProfileUpdate;
use crate::services::otp::RegistrationRequest;
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Login request body.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Use the admin login.
    pub is_admin_login: bool,
}

/// Registration code request body.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SendRegistrationOtpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Registration code verification body.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Password reset code request body.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Password reset body.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// Profile update body. Omitted or empty fields are left unchanged.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Registration verified.
#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub message: String,
    pub email: String,
}

// =============================================================================
// Login / Logout
// =============================================================================

/// POST /api/auth/login
///
/// # Errors
///
/// 401 for wrong credentials or the wrong login door, 403 for blocked accounts.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserProfile>> {
    let user = state
        .auth()
        .login(&body.email, &body.password, body.is_admin_login)
        .await?;

    set_current_user(&session, &CurrentUser::from(&user))
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "User logged in", None);

    Ok(Json(UserProfile::from(&user)))
}

/// POST /api/auth/logout
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn logout(session: Session) -> Result<Json<MessageResponse>> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();

    Ok(MessageResponse::new("Logged out successfully"))
}

// =============================================================================
// Registration
// =============================================================================

/// POST /api/auth/send-registration-otp
///
/// # Errors
///
/// 400 for missing fields or an email that is already registered.
#[instrument(skip_all)]
pub async fn send_registration_otp(
    State(state): State<AppState>,
    Json(body): Json<SendRegistrationOtpRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .otp()
        .request_registration(
            &body.email,
            RegistrationRequest {
                first_name: body.first_name,
                last_name: body.last_name,
                password: body.password,
            },
        )
        .await?;

    Ok(MessageResponse::new("OTP sent to your email"))
}

/// POST /api/auth/verify-registration-otp
///
/// Creates the account. The caller logs in separately afterwards.
///
/// # Errors
///
/// 400 "Invalid or expired OTP" for a wrong, missing or expired code.
#[instrument(skip_all)]
pub async fn verify_registration_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Response> {
    let verified = state
        .otp()
        .verify_registration(&body.email, &body.otp)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(VerifiedResponse {
            message: "Account verified successfully. Please log in.".to_string(),
            email: verified.email.to_string(),
        }),
    )
        .into_response())
}

// =============================================================================
// Password Reset
// =============================================================================

/// POST /api/auth/forgot-password
///
/// # Errors
///
/// 404 if no account uses the email.
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state.otp().request_password_reset(&body.email).await?;

    Ok(MessageResponse::new("Password reset OTP sent to your email"))
}

/// POST /api/auth/reset-password
///
/// # Errors
///
/// 400 for a missing password or a wrong, missing or expired code.
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .otp()
        .reset_password(&body.email, &body.otp, &body.new_password)
        .await?;

    Ok(MessageResponse::new("Password reset successfully"))
}

// =============================================================================
// Profile
// =============================================================================

/// GET /api/auth/profile
#[allow(clippy::unused_async)]
pub async fn get_profile(RequireAuth(user): RequireAuth) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// PUT /api/auth/profile
///
/// # Errors
///
/// 400 for an invalid email, weak password, or an email already in use.
#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let updated = state
        .auth()
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
                password: body.password,
            },
        )
        .await?;

    // Keep the session identity in step with a changed email.
    if updated.email != user.email {
        session
            .insert(
                keys::CURRENT_USER,
                CurrentUser::from(&updated),
            )
            .await
            .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    }

    Ok(Json(UserProfile::from(&updated)))
}
