/// Subscription lookup
///
/// `GET /v1/subscription` accepts a JWT or an `X-Api-Key` header and returns
/// the caller's subscription.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use accord_shared::{auth::middleware::AuthContext, models::subscription::Subscription};
use axum::{extract::State, Extension, Json};

/// The caller's subscription
///
/// # Errors
///
/// - `404 Not Found`: The caller has no subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Subscription>> {
    let subscription = Subscription::find_by_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Subscription of user not found".to_string()))?;

    tracing::debug!(
        user_id = %auth.user_id,
        method = ?auth.method,
        subscription_id = %subscription.id,
        "Subscription looked up"
    );

    Ok(Json(subscription))
}
