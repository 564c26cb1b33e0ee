/// JWT issuing and validation
///
/// Tokens are HS256-signed, carry issuer `accord`, and come in three kinds:
///
/// | Kind | Lifetime | Used for |
/// |------|----------|----------|
/// | `access` | 24 hours | authenticating API calls |
/// | `refresh` | 30 days | obtaining new access tokens |
/// | `verification` | 48 hours | the link in the signup email |
///
/// A token of one kind is never accepted where another kind is expected.
///
/// # Example
///
/// ```
/// use accord_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let claims = Claims::new(user_id, "ada@example.com", TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-long-enough-for-hs256")?;
///
/// let validated = validate_access_token(&token, "a-secret-that-is-long-enough-for-hs256")?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer written into and required from every token
pub const ISSUER: &str = "accord";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Encoding failed
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, structure, or claim validation failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// `exp` is in the past
    #[error("Token has expired")]
    Expired,

    /// `iss` is not [`ISSUER`]
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Valid token of the wrong kind
    #[error("Expected {expected} token, got {actual} token")]
    WrongType {
        expected: TokenType,
        actual: TokenType,
    },
}

/// Token kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Authenticates API calls
    Access,

    /// Exchanged for new access tokens
    Refresh,

    /// Confirms ownership of the signup email address
    Verification,
}

impl TokenType {
    /// Lifetime applied by [`Claims::new`]
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
            TokenType::Verification => Duration::hours(48),
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Verification => "verification",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user ID
    pub sub: Uuid,

    /// Email of the user when the token was issued
    pub email: String,

    /// Issuer, always [`ISSUER`]
    pub iss: String,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expires at (Unix seconds)
    pub exp: i64,

    /// Not valid before (Unix seconds)
    pub nbf: i64,

    /// Token kind
    pub token_type: TokenType,
}

impl Claims {
    /// Claims with the default lifetime for `token_type`
    pub fn new(user_id: Uuid, email: impl Into<String>, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, email, token_type, token_type.default_expiration())
    }

    /// Claims with a custom lifetime (negative values produce expired tokens)
    pub fn with_expiration(
        user_id: Uuid,
        email: impl Into<String>,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            email: email.into(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            token_type,
        }
    }

    /// Whether `exp` has passed
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Validates signature, expiry, not-before and issuer
///
/// Any token kind is accepted; use the typed wrappers at call sites.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::ValidationError(e.to_string()),
        })
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongType {
            expected,
            actual: claims.token_type,
        });
    }

    Ok(claims)
}

/// Validates an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

/// Validates a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

/// Validates an email verification token
pub fn validate_verification_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Verification)
}

/// Exchanges a refresh token for a fresh access token
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, JwtError> {
    let refresh = validate_refresh_token(refresh_token, secret)?;
    let access = Claims::new(refresh.sub, refresh.email, TokenType::Access);

    create_token(&access, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn token_for(kind: TokenType) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "ada@example.com", kind);
        (user_id, create_token(&claims, SECRET).unwrap())
    }

    #[test]
    fn test_default_expirations() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
        assert_eq!(TokenType::Verification.default_expiration(), Duration::hours(48));
    }

    #[test]
    fn test_claims_new() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "ada@example.com", TokenType::Access);

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.iss, ISSUER);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_create_and_validate() {
        let (user_id, token) = token_for(TokenType::Access);

        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (_, token) = token_for(TokenType::Access);
        assert!(matches!(
            validate_token(&token, "another-secret-another-secret-xx"),
            Err(JwtError::ValidationError(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            "ada@example.com",
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Access);
        claims.iss = "someone-else".to_string();

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::InvalidIssuer)));
    }

    #[test]
    fn test_token_kinds_not_interchangeable() {
        let (_, access) = token_for(TokenType::Access);
        let (_, refresh) = token_for(TokenType::Refresh);
        let (_, verification) = token_for(TokenType::Verification);

        assert!(validate_access_token(&access, SECRET).is_ok());
        assert!(validate_refresh_token(&refresh, SECRET).is_ok());
        assert!(validate_verification_token(&verification, SECRET).is_ok());

        assert!(matches!(
            validate_access_token(&verification, SECRET),
            Err(JwtError::WrongType {
                expected: TokenType::Access,
                actual: TokenType::Verification
            })
        ));
        assert!(validate_refresh_token(&access, SECRET).is_err());
        assert!(validate_verification_token(&refresh, SECRET).is_err());
    }

    #[test]
    fn test_refresh_access_token() {
        let (user_id, refresh) = token_for(TokenType::Refresh);

        let access = refresh_access_token(&refresh, SECRET).unwrap();
        let claims = validate_access_token(&access, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ada@example.com");
    }

    #[test]
    fn test_refresh_with_access_token_fails() {
        let (_, access) = token_for(TokenType::Access);
        assert!(refresh_access_token(&access, SECRET).is_err());
    }
}
