/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/signup` - Create an account
/// - `GET /v1/auth/verify?token=...` - Confirm an email address
/// - `POST /v1/auth/login` - Exchange credentials for tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for an access token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::validation::{
        validate_email, validate_first_name, validate_last_name, validate_password,
        ValidatedJson,
    },
};
use accord_shared::{
    auth::{
        jwt::{self, Claims, TokenType},
        middleware::JWT_COOKIE,
        password,
    },
    email::verification_email,
    models::{
        subscription::{Subscription, SubscriptionType},
        user::{CreateUser, User},
    },
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(custom(function = "validate_first_name"))]
    pub first_name: String,

    #[validate(custom(function = "validate_last_name"))]
    pub last_name: String,

    #[validate(custom(function = "validate_email"))]
    pub email: String,

    #[validate(custom(function = "validate_password"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

/// Signup response
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    /// The created user
    pub user: User,

    /// False when the verification email could not be handed off
    pub verification_email_sent: bool,
}

/// Verification link query
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

/// Verification response
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub email: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "validate_email"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// User ID
    pub user_id: String,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Refresh token request
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
}

/// Create an account
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/signup
/// Content-Type: application/json
///
/// {
///   "first_name": "Ada",
///   "last_name": "Lovelace",
///   "email": "ada@example.com",
///   "password": "analytical",
///   "confirm_password": "analytical"
/// }
/// ```
///
/// The user gets a free subscription and a verification email. A mail
/// failure does not fail the signup; it shows up as
/// `verification_email_sent: false`.
///
/// # Errors
///
/// - `409 Conflict`: Email already exists
/// - `422 Unprocessable Entity`: Validation failed
/// - `500 Internal Server Error`: The subscription could not be created
///   (the user row is kept)
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    let email = req.email.trim().to_string();

    if User::email_exists(&state.db, &email).await? {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let password_hash = password::hash_password(req.password.trim())?;

    let user = User::create(
        &state.db,
        CreateUser {
            email,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            password_hash,
        },
    )
    .await?;

    if let Err(e) = Subscription::create(&state.db, user.id, SubscriptionType::Free).await {
        error!(user_id = %user.id, error = %e, "Failed to create default subscription");
        return Err(ApiError::InternalError(format!(
            "Failed to create subscription for user {}: {}",
            user.id, e
        )));
    }

    let verification_email_sent = send_verification(&state, &user).await;

    info!(user_id = %user.id, verification_email_sent, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user,
            verification_email_sent,
        }),
    ))
}

async fn send_verification(state: &AppState, user: &User) -> bool {
    let claims = Claims::new(user.id, user.email.clone(), TokenType::Verification);
    let token = match jwt::create_token(&claims, state.jwt_secret()) {
        Ok(token) => token,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Could not sign verification token");
            return false;
        }
    };

    let message = verification_email(
        &user.email,
        &user.first_name,
        &state.config.verification_url(&token),
    );

    match state.mailer.send(message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Verification email not sent");
            false
        }
    }
}

/// Confirm an email address from the emailed link
///
/// # Errors
///
/// - `401 Unauthorized`: Token invalid, expired, or not a verification token
/// - `404 Not Found`: The user no longer exists
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Json<VerifyResponse>> {
    let claims = jwt::validate_verification_token(&query.token, state.jwt_secret())?;

    let user = User::mark_verified(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(user_id = %user.id, "Email verified");

    Ok(Json(VerifyResponse {
        verified: user.is_verified,
        email: user.email,
    }))
}

/// Exchange credentials for tokens
///
/// The access token is returned in the body and also set as the `jwt`
/// cookie for browser clients.
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
/// - `422 Unprocessable Entity`: Validation failed
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<(HeaderMap, Json<LoginResponse>)> {
    let invalid_credentials = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !password::verify_password(req.password.trim(), &user.password_hash)? {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid_credentials());
    }

    let secret = state.jwt_secret();
    let access_token =
        jwt::create_token(&Claims::new(user.id, user.email.clone(), TokenType::Access), secret)?;
    let refresh_token =
        jwt::create_token(&Claims::new(user.id, user.email.clone(), TokenType::Refresh), secret)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        session_cookie(&access_token, state.config.api.production)?,
    );

    info!(user_id = %user.id, "User logged in");

    Ok((
        headers,
        Json(LoginResponse {
            user_id: user.id.to_string(),
            access_token,
            refresh_token,
        }),
    ))
}

fn session_cookie(token: &str, secure: bool) -> ApiResult<HeaderValue> {
    let max_age = TokenType::Access.default_expiration().num_seconds();
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        JWT_COOKIE, token, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::InternalError(format!("Invalid cookie value: {}", e)))
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `401 Unauthorized`: Token invalid, expired, or not a refresh token
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}
