/// Endpoints for the authenticated user's own account
///
/// All routes require a JWT.
///
/// - `GET /v1/users/me` - Profile, subscription and keys
/// - `PATCH /v1/users/me` - Update names
/// - `PUT /v1/users/me/password` - Change password
/// - `DELETE /v1/users/me` - Delete the account and everything it owns

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::validation::{
        validate_first_name, validate_last_name, validate_password, ValidatedJson,
    },
};
use accord_shared::{
    account::{DeletionOutcome, DeletionPath},
    auth::{middleware::AuthContext, password},
    models::{
        api_key::ApiKey,
        subscription::Subscription,
        user::{UpdateUser, User},
    },
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Key as shown on the profile
#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub description: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
}

/// Profile response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub subscription_id: Uuid,
    pub subscription_type: String,
    pub usage_limit: i32,
    pub is_active: bool,
    pub keys: Vec<KeySummary>,
}

/// Profile update; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_first_name"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "validate_last_name"))]
    pub last_name: Option<String>,
}

/// Password change request
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(custom(function = "validate_password"))]
    pub new_password: String,

    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Password change response
#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub updated: bool,
}

/// Account deletion response
#[derive(Debug, Serialize)]
pub struct DeleteAccountResponse {
    pub deleted: bool,
    pub subscriptions_deleted: u64,
    pub keys_deleted: u64,
    pub mode: DeletionPath,
}

/// Profile of the caller
///
/// # Errors
///
/// - `404 Not Found`: "User not found" or "Subscription of user not found"
pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let subscription = Subscription::find_by_user(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Subscription of user not found".to_string()))?;

    let keys = ApiKey::list_by_user(&state.db, user.id)
        .await?
        .into_iter()
        .map(|key| KeySummary {
            description: key.description,
            key_prefix: key.key_prefix,
            created_at: key.created_at,
        })
        .collect();

    Ok(Json(MeResponse {
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        subscription_id: subscription.id,
        subscription_type: subscription.subscription_type,
        usage_limit: subscription.usage_limit,
        is_active: subscription.is_active,
        keys,
    }))
}

/// Update the caller's names
///
/// # Errors
///
/// - `400 Bad Request`: Neither field given
/// - `404 Not Found`: User no longer exists
/// - `422 Unprocessable Entity`: Validation failed
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let update = UpdateUser {
        first_name: req.first_name.map(|name| name.trim().to_string()),
        last_name: req.last_name.map(|name| name.trim().to_string()),
        ..Default::default()
    };

    if update.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let user = User::update(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(user))
}

/// Change the caller's password
///
/// # Errors
///
/// - `400 Bad Request`: Current password is wrong
/// - `404 Not Found`: User no longer exists
/// - `422 Unprocessable Entity`: Validation failed
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<ChangePasswordResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !password::verify_password(req.current_password.trim(), &user.password_hash)? {
        return Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = password::hash_password(req.new_password.trim())?;
    let updated = User::set_password(&state.db, user.id, password_hash).await?;

    info!(user_id = %user.id, "Password changed");
    Ok(Json(ChangePasswordResponse { updated }))
}

/// Delete the caller's account
///
/// Removes the user with every subscription and API key it owns. When the
/// database supports transactions the three deletions commit together.
///
/// # Response
///
/// ```json
/// {
///   "deleted": true,
///   "subscriptions_deleted": 1,
///   "keys_deleted": 2,
///   "mode": "transactional"
/// }
/// ```
///
/// # Errors
///
/// - `404 Not Found`: User does not exist
/// - `409 Conflict` (`transaction_aborted`): Rolled back, nothing removed
/// - `500 Internal Server Error` (`partial_deletion`): Some records removed
/// - `503 Service Unavailable`: Storage unreachable, nothing removed
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<DeleteAccountResponse>> {
    match state.accounts.delete_account(auth.user_id).await? {
        DeletionOutcome::Committed(report) => Ok(Json(DeleteAccountResponse {
            deleted: true,
            subscriptions_deleted: report.subscriptions_deleted,
            keys_deleted: report.keys_deleted,
            mode: report.mode,
        })),
        DeletionOutcome::NotFound => Err(ApiError::NotFound("User not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_change_mismatch() {
        let req = ChangePasswordRequest {
            current_password: "old-password".to_string(),
            new_password: "new-password".to_string(),
            confirm_password: "other-password".to_string(),
        };

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("confirm_password"));
    }

    #[test]
    fn test_profile_update_validates_present_fields_only() {
        let req = UpdateProfileRequest {
            first_name: None,
            last_name: Some("Byron".to_string()),
        };
        assert!(req.validate().is_ok());

        let req = UpdateProfileRequest {
            first_name: Some("B0b".to_string()),
            last_name: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_delete_response_shape() {
        let body = serde_json::to_value(DeleteAccountResponse {
            deleted: true,
            subscriptions_deleted: 1,
            keys_deleted: 2,
            mode: DeletionPath::Direct,
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "deleted": true,
                "subscriptions_deleted": 1,
                "keys_deleted": 2,
                "mode": "direct"
            })
        );
    }
}
