/// API key model and database operations
///
/// API keys let a user call the API without a JWT. Only a SHA-256 hash and a
/// short display prefix are stored; the plaintext key is returned once by
/// [`ApiKey::create`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE api_keys (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     description VARCHAR(50) NOT NULL,
///     key_prefix VARCHAR(10) NOT NULL,
///     key_hash VARCHAR(64) NOT NULL UNIQUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use accord_shared::models::api_key::{ApiKey, CreateApiKey};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let (record, plaintext) = ApiKey::create(&pool, CreateApiKey {
///     user_id,
///     description: "Reporting job".to_string(),
/// })
/// .await?;
///
/// // plaintext is never retrievable again
/// println!("{} -> {}", record.key_prefix, plaintext);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::auth::api_key::{display_prefix, generate_api_key, hash_api_key};

/// Stored API key
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique key ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Free-form label chosen by the user
    pub description: String,

    /// First characters of the key, safe to display
    pub key_prefix: String,

    /// SHA-256 hex digest of the full key
    #[serde(skip_serializing, default)]
    pub key_hash: String,

    /// When the key was issued
    pub created_at: DateTime<Utc>,

    /// When the key was last modified
    pub updated_at: DateTime<Utc>,
}

/// Input for [`ApiKey::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKey {
    /// Owning user
    pub user_id: Uuid,

    /// Label for the key
    pub description: String,
}

impl ApiKey {
    /// Issues a new key
    ///
    /// Returns the stored record and the plaintext key.
    pub async fn create(pool: &PgPool, data: CreateApiKey) -> Result<(Self, String), sqlx::Error> {
        let (plaintext, key_hash) = generate_api_key();

        let api_key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (user_id, description, key_prefix, key_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, description, key_prefix, key_hash, created_at, updated_at
            "#,
        )
        .bind(data.user_id)
        .bind(data.description)
        .bind(display_prefix(&plaintext))
        .bind(key_hash)
        .fetch_one(pool)
        .await?;

        Ok((api_key, plaintext))
    }

    /// Resolves a plaintext key to its record
    ///
    /// Returns None for unknown keys.
    pub async fn find_by_plaintext(pool: &PgPool, plaintext: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, description, key_prefix, key_hash, created_at, updated_at
            FROM api_keys
            WHERE key_hash = $1
            "#,
        )
        .bind(hash_api_key(plaintext))
        .fetch_optional(pool)
        .await
    }

    /// Lists a user's keys, newest first
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, description, key_prefix, key_hash, created_at, updated_at
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes one key if it belongs to `user_id`
    pub async fn delete_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every key owned by a user
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM api_keys WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
