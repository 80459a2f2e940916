//! Authentication extractors.
//!
//! The session only records who logged in. Every authenticated request
//! re-reads the account so a block or deletion takes effect immediately.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::session::keys;
use crate::models::{CurrentUser, User};
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Extractor that requires a logged-in, unblocked account.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub User);

/// Extractor that requires a logged-in administrator.
pub struct RequireAdmin(pub User);

async fn current_session_user(parts: &Parts) -> Result<CurrentUser, AppError> {
    // Get the session from extensions (set by SessionManagerLayer)
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or_else(|| AppError::Unauthorized("Not authorized, no session".to_string()))?;

    // A store failure is a server error, not a missing login.
    session
        .get::<CurrentUser>(keys::CURRENT_USER)
        .await
        .map_err(|e| AppError::Internal(format!("session store error: {e}")))?
        .ok_or_else(|| AppError::Unauthorized("Not authorized, please log in".to_string()))
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = current_session_user(parts).await?;

        let user = match state.auth().get_user(current.id).await {
            Ok(user) => user,
            Err(AuthError::UserNotFound) => {
                return Err(AppError::Unauthorized(
                    "Not authorized, user not found".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if user.is_blocked {
            return Err(AuthError::Blocked.into());
        }

        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;

        if !user.is_admin {
            return Err(AppError::Unauthorized(
                "Not authorized as an admin".to_string(),
            ));
        }

        Ok(Self(user))
    }
}

/// Helper to set the current user in the session.
///
/// The session id is cycled first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<CurrentUser>(keys::CURRENT_USER).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Request, StatusCode};
    use tower_sessions::session::{Id, Record};
    use tower_sessions::{MemoryStore, SessionStore, session_store};

    use smart_print_core::{Email, UserId};

    use super::*;

    #[derive(Debug)]
    struct UnavailableStore;

    #[async_trait::async_trait]
    impl SessionStore for UnavailableStore {
        async fn save(&self, _record: &Record) -> session_store::Result<()> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }

        async fn load(&self, _session_id: &Id) -> session_store::Result<Option<Record>> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }

        async fn delete(&self, _session_id: &Id) -> session_store::Result<()> {
            Err(session_store::Error::Backend("connection refused".to_owned()))
        }
    }

    fn parts_with(session: Session) -> Parts {
        let (mut parts, ()) = Request::new(()).into_parts();
        parts.extensions.insert(session);
        parts
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let session = Session::new(Some(Id::default()), Arc::new(UnavailableStore), None);

        let err = current_session_user(&parts_with(session)).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_login_is_unauthorized() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let err = current_session_user(&parts_with(session)).await.unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_session_layer_is_unauthorized() {
        let (parts, ()) = Request::new(()).into_parts();

        let err = current_session_user(&parts).await.unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_logged_in_user_is_read_back() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let user = CurrentUser {
            id: UserId::new(7),
            email: Email::parse("a@b.co").unwrap(),
            is_admin: false,
        };
        session.insert(keys::CURRENT_USER, &user).await.unwrap();

        let current = current_session_user(&parts_with(session)).await.unwrap();

        assert_eq!(current.id, UserId::new(7));
    }
}
