/// API key management endpoints
///
/// Managing keys needs a user session; a request authenticated with an API
/// key is refused with 403.
///
/// # Endpoints
///
/// - `POST /v1/keys` - Issue a key
/// - `GET /v1/keys` - List keys (masked)
/// - `DELETE /v1/keys/:id` - Delete a key

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::validation::{parse_key_id, validate_key_description, ValidatedJson},
};
use accord_shared::{
    auth::{authorization::require_session, middleware::AuthContext},
    models::{
        api_key::{ApiKey, CreateApiKey},
        user::User,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Create key request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateKeyRequest {
    #[validate(custom(function = "validate_key_description"))]
    pub description: String,
}

/// Create key response
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub id: Uuid,

    /// The plaintext key
    ///
    /// Only returned here; the server keeps a hash.
    pub key: String,

    pub description: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
}

/// Key list item (masked)
#[derive(Debug, Serialize)]
pub struct KeyInfo {
    pub id: Uuid,
    pub description: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKey> for KeyInfo {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            description: key.description,
            key_prefix: key.key_prefix,
            created_at: key.created_at,
        }
    }
}

/// List keys response
#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    pub keys: Vec<KeyInfo>,
}

/// Delete key response
#[derive(Debug, Serialize)]
pub struct DeleteKeyResponse {
    pub deleted: bool,
}

/// Issue a key
///
/// # Endpoint
///
/// ```text
/// POST /v1/keys
/// Authorization: Bearer <jwt>
///
/// { "description": "Reporting job" }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: Called with an API key
/// - `404 Not Found`: Caller's account no longer exists
/// - `422 Unprocessable Entity`: Description is not letters and spaces
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<CreateKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreateKeyResponse>)> {
    require_session(&auth)?;

    if User::find_by_id(&state.db, auth.user_id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let (api_key, key) = ApiKey::create(
        &state.db,
        CreateApiKey {
            user_id: auth.user_id,
            description: req.description.trim().to_string(),
        },
    )
    .await?;

    info!(user_id = %auth.user_id, key_id = %api_key.id, "API key created");

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            id: api_key.id,
            key,
            description: api_key.description,
            key_prefix: api_key.key_prefix,
            created_at: api_key.created_at,
        }),
    ))
}

/// List the caller's keys, newest first
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ListKeysResponse>> {
    require_session(&auth)?;

    let keys = ApiKey::list_by_user(&state.db, auth.user_id)
        .await?
        .into_iter()
        .map(KeyInfo::from)
        .collect();

    Ok(Json(ListKeysResponse { keys }))
}

/// Delete one of the caller's keys
///
/// # Errors
///
/// - `404 Not Found`: No such key, or it belongs to someone else
/// - `422 Unprocessable Entity`: `id` is not a UUID
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteKeyResponse>> {
    require_session(&auth)?;
    let key_id = parse_key_id(&id)?;

    if !ApiKey::delete_for_user(&state.db, key_id, auth.user_id).await? {
        return Err(ApiError::NotFound("API key not found".to_string()));
    }

    info!(user_id = %auth.user_id, key_id = %key_id, "API key deleted");
    Ok(Json(DeleteKeyResponse { deleted: true }))
}
