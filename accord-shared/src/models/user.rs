/// User model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL, -- unique on LOWER(email)
///     first_name VARCHAR(64) NOT NULL,
///     last_name VARCHAR(64) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Reads and deletes that may run inside an account-deletion transaction
/// take any [`PgExecutor`], so they work with both a pool and a transaction
/// connection.
///
/// # Example
///
/// ```no_run
/// use accord_shared::models::user::{User, CreateUser};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.com".to_string(),
///     first_name: "Ada".to_string(),
///     last_name: "Lovelace".to_string(),
///     password_hash: "$argon2id$...".to_string(),
/// })
/// .await?;
///
/// let found = User::find_by_email(&pool, "ADA@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address, unique and case-insensitive (CITEXT)
    pub email: String,

    /// Given name
    pub first_name: String,

    /// Family name
    pub last_name: String,

    /// Argon2id hash in PHC format. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Set once the email verification link has been followed
    pub is_verified: bool,

    /// Grants access to the admin routes
    pub is_admin: bool,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last modified
    pub updated_at: DateTime<Utc>,
}

/// Input for [`User::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address
    pub email: String,

    /// Given name
    pub first_name: String,

    /// Family name
    pub last_name: String,

    /// Argon2id hash (NOT the plaintext password)
    pub password_hash: String,
}

/// Partial update for [`User::update`]
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    /// New given name
    pub first_name: Option<String>,

    /// New family name
    pub last_name: Option<String>,

    /// New password hash
    pub password_hash: Option<String>,

    /// New verification state
    pub is_verified: Option<bool>,
}

impl UpdateUser {
    /// Whether the update would change anything
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.password_hash.is_none()
            && self.is_verified.is_none()
    }
}

/// Result of [`User::grant_admin`]
#[derive(Debug, Clone)]
pub struct AdminGrant {
    /// The user after the grant
    pub user: User,

    /// False when the user already was an admin
    pub newly_granted: bool,
}

impl User {
    /// Full display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Inserts a new user
    ///
    /// # Errors
    ///
    /// Fails with a database error on the `users_email_key` constraint when the
    /// email is already registered.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, first_name, last_name, password_hash,
                      is_verified, is_admin, created_at, updated_at
            "#,
        )
        .bind(data.email)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.password_hash)
        .fetch_one(pool)
        .await
    }

    /// Looks a user up by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, password_hash,
                   is_verified, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Looks a user up by email (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, password_hash,
                   is_verified, is_admin, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Whether an account with this email exists
    pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(email)
            .fetch_one(pool)
            .await
    }

    /// Applies a partial update and bumps `updated_at`
    ///
    /// Returns None when the user does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        // COALESCE keeps the stored value for every NULL parameter
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                password_hash = COALESCE($4, password_hash),
                is_verified = COALESCE($5, is_verified),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, first_name, last_name, password_hash,
                      is_verified, is_admin, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.password_hash)
        .bind(data.is_verified)
        .fetch_optional(pool)
        .await
    }

    /// Replaces the password hash
    pub async fn set_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: String,
    ) -> Result<bool, sqlx::Error> {
        let updated = Self::update(
            pool,
            id,
            UpdateUser {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

        Ok(updated.is_some())
    }

    /// Marks the email address as verified
    ///
    /// Returns None when the user does not exist.
    pub async fn mark_verified(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        Self::update(
            pool,
            id,
            UpdateUser {
                is_verified: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    /// Grants admin privileges to the user with this email
    ///
    /// Returns None when no such user exists. Granting twice is not an error;
    /// the second call reports `newly_granted = false`.
    pub async fn grant_admin(pool: &PgPool, email: &str) -> Result<Option<AdminGrant>, sqlx::Error> {
        let granted = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_admin = TRUE, updated_at = NOW()
            WHERE LOWER(email) = LOWER($1) AND is_admin = FALSE
            RETURNING id, email, first_name, last_name, password_hash,
                      is_verified, is_admin, created_at, updated_at
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        if let Some(user) = granted {
            return Ok(Some(AdminGrant {
                user,
                newly_granted: true,
            }));
        }

        Ok(Self::find_by_email(pool, email)
            .await?
            .map(|user| AdminGrant {
                user,
                newly_granted: false,
            }))
    }

    /// Deletes a user row
    ///
    /// Dependent subscriptions and API keys are NOT touched. Use
    /// [`crate::account::AccountDeletion`] to remove an account.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users, newest first
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, first_name, last_name, password_hash,
                   is_verified, is_admin, created_at, updated_at
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts all users
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }
}
