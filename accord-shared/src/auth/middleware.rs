/// Credential extraction and request authentication
///
/// Requests authenticate with either a JWT access token or an API key:
///
/// - JWT: `Authorization: Bearer <token>` header, or the `jwt` cookie when
///   the header is absent
/// - API key: `X-Api-Key` header
///
/// On success an [`AuthContext`] is inserted into the request extensions and
/// handlers read it with `Extension<AuthContext>`.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use accord_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     auth.user_id.to_string()
/// }
///
/// let secret = "a-secret-that-is-long-enough-for-hs256".to_string();
/// let app: Router = Router::new()
///     .route("/whoami", get(whoami))
///     .layer(middleware::from_fn(move |req, next| {
///         jwt_auth_middleware(secret.clone(), req, next)
///     }));
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::api_key::validate_api_key_format;
use super::jwt::{validate_access_token, JwtError};
use crate::models::api_key::ApiKey;

/// Cookie carrying the access token for browser clients
pub const JWT_COOKIE: &str = "jwt";

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// JWT access token
    Jwt,

    /// API key
    ApiKey,
}

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user
    pub user_id: Uuid,

    /// Email from the token (None for API key auth)
    pub email: Option<String>,

    /// How the caller authenticated
    pub method: AuthMethod,

    /// Key used (only for API key auth)
    pub api_key_id: Option<Uuid>,
}

impl AuthContext {
    /// Context for a validated access token
    pub fn from_jwt(user_id: Uuid, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: Some(email.into()),
            method: AuthMethod::Jwt,
            api_key_id: None,
        }
    }

    /// Context for a resolved API key
    pub fn from_api_key(api_key: &ApiKey) -> Self {
        Self {
            user_id: api_key.user_id,
            email: None,
            method: AuthMethod::ApiKey,
            api_key_id: Some(api_key.id),
        }
    }
}

/// Authentication failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token, cookie or key present
    #[error("Missing credentials")]
    MissingCredentials,

    /// Authorization header is not `Bearer <token>`
    #[error("{0}")]
    InvalidFormat(String),

    /// Token rejected
    #[error("{0}")]
    InvalidToken(String),

    /// Key unknown or malformed
    #[error("{0}")]
    InvalidApiKey(String),

    /// Lookup failed
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AuthError {
    /// HTTP status for the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            AuthError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AuthError::DatabaseError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({ "error": "unauthorized", "message": message })),
        )
            .into_response()
    }
}

/// Token from `Authorization: Bearer <token>`
///
/// `Ok(None)` when the header is absent; an error when it is present but
/// not a bearer token.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Invalid authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Value of a cookie
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Value of the `X-Api-Key` header
pub fn api_key_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Authenticates the request's JWT (header first, then cookie)
pub fn authenticate_jwt(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let token = match bearer_token(headers)? {
        Some(token) => token,
        None => cookie_value(headers, JWT_COOKIE).ok_or(AuthError::MissingCredentials)?,
    };

    let claims = validate_access_token(token, secret)?;

    Ok(AuthContext::from_jwt(claims.sub, claims.email))
}

/// Resolves an API key to its owner
pub async fn authenticate_api_key(pool: &PgPool, key: &str) -> Result<AuthContext, AuthError> {
    if !validate_api_key_format(key) {
        return Err(AuthError::InvalidApiKey("Invalid API key format".to_string()));
    }

    let api_key = ApiKey::find_by_plaintext(pool, key)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AuthError::InvalidApiKey("Invalid API key".to_string()))?;

    Ok(AuthContext::from_api_key(&api_key))
}

/// Middleware accepting only JWT credentials
pub async fn jwt_auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = authenticate_jwt(req.headers(), &secret)?;
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Middleware accepting an API key or, without one, a JWT
pub async fn jwt_or_api_key_middleware(
    pool: PgPool,
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = match api_key_header(req.headers()) {
        Some(key) => authenticate_api_key(&pool, key).await?,
        None => authenticate_jwt(req.headers(), &secret)?,
    };
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, Claims, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn access_token(user_id: Uuid) -> String {
        create_token(&Claims::new(user_id, "ada@example.com", TokenType::Access), SECRET).unwrap()
    }

    #[test]
    fn test_auth_context_from_jwt() {
        let user_id = Uuid::new_v4();
        let context = AuthContext::from_jwt(user_id, "ada@example.com");

        assert_eq!(context.user_id, user_id);
        assert_eq!(context.email.as_deref(), Some("ada@example.com"));
        assert_eq!(context.method, AuthMethod::Jwt);
        assert!(context.api_key_id.is_none());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&HeaderMap::new()).unwrap(), None);
        assert_eq!(
            bearer_token(&headers(&[("authorization", "Bearer abc")])).unwrap(),
            Some("abc")
        );
        assert!(matches!(
            bearer_token(&headers(&[("authorization", "Basic abc")])),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_cookie_value() {
        let map = headers(&[("cookie", "theme=dark; jwt=tok123; lang=en")]);
        assert_eq!(cookie_value(&map, "jwt"), Some("tok123"));
        assert_eq!(cookie_value(&map, "missing"), None);
        assert_eq!(cookie_value(&headers(&[("cookie", "jwt=")]), "jwt"), None);
    }

    #[test]
    fn test_authenticate_jwt_from_header() {
        let user_id = Uuid::new_v4();
        let bearer = format!("Bearer {}", access_token(user_id));

        let auth = authenticate_jwt(&headers(&[("authorization", &bearer)]), SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
    }

    #[test]
    fn test_authenticate_jwt_from_cookie() {
        let user_id = Uuid::new_v4();
        let cookie = format!("jwt={}", access_token(user_id));

        let auth = authenticate_jwt(&headers(&[("cookie", &cookie)]), SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
    }

    #[test]
    fn test_authenticate_jwt_missing() {
        assert!(matches!(
            authenticate_jwt(&HeaderMap::new(), SECRET),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_authenticate_jwt_rejects_refresh_token() {
        let refresh = create_token(
            &Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Refresh),
            SECRET,
        )
        .unwrap();
        let bearer = format!("Bearer {}", refresh);

        assert!(matches!(
            authenticate_jwt(&headers(&[("authorization", &bearer)]), SECRET),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidFormat("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::DatabaseError("x".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
