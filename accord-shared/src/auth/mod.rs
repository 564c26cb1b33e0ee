/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the length policy
/// - [`jwt`]: access, refresh and verification tokens
/// - [`api_key`]: API key generation and hashing
/// - [`middleware`]: credential extraction and [`middleware::AuthContext`]
/// - [`authorization`]: administrator and ownership checks
///
/// # Example
///
/// ```no_run
/// use accord_shared::auth::jwt::{create_token, Claims, TokenType};
/// use accord_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-long-enough-for-hs256")?;
/// # Ok(())
/// # }
/// ```

pub mod api_key;
pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
