//! Admin user management route handlers.
//!
//! Every handler requires an administrator session.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use smart_print_core::UserId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::user::{UserProfile, UserQuery};
use crate::state::AppState;

/// Query parameters for the user listing.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

/// One page of users.
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserProfile>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

/// Result of an admin action on one user.
#[derive(Debug, Serialize)]
pub struct UserActionResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// GET /api/auth/users?page&limit&search
///
/// # Errors
///
/// 401 without an admin session.
#[instrument(skip(state, _admin))]
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>> {
    let query = UserQuery::new(query.page, query.limit, query.search);
    let page = state.auth().list_users(&query).await?;

    Ok(Json(UserListResponse {
        users: page.users.iter().map(UserProfile::from).collect(),
        page: page.page,
        pages: page.pages,
        total: page.total,
    }))
}

/// DELETE /api/auth/users/{id}
///
/// # Errors
///
/// 404 for an unknown user, 400 for an administrator account.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<UserActionResponse>> {
    state.auth().delete_user(UserId::new(id)).await?;

    Ok(Json(UserActionResponse {
        message: "User removed".to_string(),
        user: None,
    }))
}

/// PUT /api/auth/users/{id}/block
///
/// # Errors
///
/// 404 for an unknown user, 400 for an administrator account.
#[instrument(skip(state, _admin))]
pub async fn block(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<UserActionResponse>> {
    let user = state.auth().block_user(UserId::new(id)).await?;

    Ok(Json(UserActionResponse {
        message: "User blocked successfully".to_string(),
        user: Some(UserProfile::from(&user)),
    }))
}

/// PUT /api/auth/users/{id}/unblock
///
/// # Errors
///
/// 404 for an unknown user.
#[instrument(skip(state, _admin))]
pub async fn unblock(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<UserActionResponse>> {
    let user = state.auth().unblock_user(UserId::new(id)).await?;

    Ok(Json(UserActionResponse {
        message: "User unblocked successfully".to_string(),
        user: Some(UserProfile::from(&user)),
    }))
}
