/// Administrator endpoints
///
/// Both routes need a JWT whose user has the stored `is_admin` flag; the
/// flag is read from the database on every request, so a revoked admin
/// loses access immediately.
///
/// - `POST /v1/admin/grant` - Make another user an administrator
/// - `GET /v1/admin/users` - Paginated user list

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::validation::{validate_email, ValidatedJson},
};
use accord_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::user::User,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Default page size for user listing
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size for user listing
pub const MAX_PAGE_SIZE: i64 = 100;

/// Grant request
#[derive(Debug, Deserialize, Validate)]
pub struct GrantAdminRequest {
    #[validate(custom(function = "validate_email"))]
    pub email: String,
}

/// Grant response (only sent when the flag changed)
#[derive(Debug, Serialize)]
pub struct GrantAdminResponse {
    pub user: User,
    pub granted: bool,
}

/// Pagination query
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Limit clamped to `1..=MAX_PAGE_SIZE` and a non-negative offset
    pub fn clamped(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// User list response
#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Grant administrator privileges
///
/// # Responses
///
/// - `200 OK`: Flag newly set
/// - `204 No Content`: User already was an administrator
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an administrator
/// - `404 Not Found`: No user with that email
pub async fn grant_admin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<GrantAdminRequest>,
) -> ApiResult<Response> {
    let admin = require_admin(&state.db, &auth).await?;

    let grant = User::grant_admin(&state.db, req.email.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !grant.newly_granted {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    info!(admin_id = %admin.id, user_id = %grant.user.id, "Administrator privileges granted");

    Ok(Json(GrantAdminResponse {
        user: grant.user,
        granted: true,
    })
    .into_response())
}

/// List users, newest first
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an administrator
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<UserListResponse>> {
    require_admin(&state.db, &auth).await?;

    let (limit, offset) = page.clamped();
    let users = User::list(&state.db, limit, offset).await?;
    let total = User::count(&state.db).await?;

    Ok(Json(UserListResponse {
        users,
        total,
        limit,
        offset,
    }))
}
