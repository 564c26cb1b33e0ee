/// Authorization checks
///
/// Accord has two roles: ordinary users and administrators. Administrator
/// status is the `is_admin` flag on the user row and is re-read on every
/// check, so a grant takes effect without issuing new tokens.
///
/// # Example
///
/// ```no_run
/// use accord_shared::auth::authorization::require_admin;
/// use accord_shared::auth::middleware::AuthContext;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, auth: AuthContext) -> Result<(), Box<dyn std::error::Error>> {
/// let admin = require_admin(&pool, &auth).await?;
/// println!("{} is an administrator", admin.email);
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::{AuthContext, AuthMethod};
use crate::models::user::User;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Caller's account no longer exists
    #[error("User {0} not found")]
    UnknownUser(Uuid),

    /// Caller is not an administrator
    #[error("Administrator privileges required")]
    NotAdmin,

    /// Operation needs an interactive session, not an API key
    #[error("This operation requires a user session")]
    SessionRequired,

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Loads the caller and checks the administrator flag
pub async fn require_admin(pool: &PgPool, auth: &AuthContext) -> Result<User, AuthzError> {
    let user = User::find_by_id(pool, auth.user_id)
        .await?
        .ok_or(AuthzError::UnknownUser(auth.user_id))?;

    if !user.is_admin {
        return Err(AuthzError::NotAdmin);
    }

    Ok(user)
}

/// Rejects API key callers
pub fn require_session(auth: &AuthContext) -> Result<(), AuthzError> {
    match auth.method {
        AuthMethod::Jwt => Ok(()),
        AuthMethod::ApiKey => Err(AuthzError::SessionRequired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_session() {
        let jwt = AuthContext::from_jwt(Uuid::new_v4(), "ada@example.com");
        assert!(require_session(&jwt).is_ok());

        let key = AuthContext {
            user_id: Uuid::new_v4(),
            email: None,
            method: AuthMethod::ApiKey,
            api_key_id: Some(Uuid::new_v4()),
        };
        assert!(matches!(require_session(&key), Err(AuthzError::SessionRequired)));
    }

    #[test]
    fn test_authz_error_display() {
        assert!(AuthzError::NotAdmin.to_string().contains("Administrator"));
        assert!(AuthzError::SessionRequired.to_string().contains("session"));
    }
}
