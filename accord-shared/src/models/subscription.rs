/// Subscription model and database operations
///
/// Every user has exactly one subscription at steady state. Signup creates a
/// [`SubscriptionType::Free`] subscription right after the user row.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE subscriptions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL,
///     subscription_type TEXT NOT NULL DEFAULT 'free',
///     usage_limit INTEGER NOT NULL DEFAULT 100,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Subscription tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    /// Default tier assigned at signup
    Free,

    /// Paid entry tier
    Basic,

    /// Paid top tier
    Premium,
}

impl SubscriptionType {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Free => "free",
            SubscriptionType::Basic => "basic",
            SubscriptionType::Premium => "premium",
        }
    }

    /// Parses the database representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionType::Free),
            "basic" => Some(SubscriptionType::Basic),
            "premium" => Some(SubscriptionType::Premium),
            _ => None,
        }
    }

    /// Usage limit granted by the tier
    pub fn default_usage_limit(&self) -> i32 {
        match self {
            SubscriptionType::Free => 100,
            SubscriptionType::Basic => 10_000,
            SubscriptionType::Premium => 100_000,
        }
    }
}

/// Subscription row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    /// Unique subscription ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Tier name, see [`SubscriptionType`]
    pub subscription_type: String,

    /// Maximum API usage allowed by the tier
    pub usage_limit: i32,

    /// Inactive subscriptions are kept for bookkeeping only
    pub is_active: bool,
}

impl Subscription {
    /// Parsed tier (None for unknown values written by hand)
    pub fn kind(&self) -> Option<SubscriptionType> {
        SubscriptionType::parse(&self.subscription_type)
    }

    /// Creates the subscription for a user
    pub async fn create<'e, E>(
        executor: E,
        user_id: Uuid,
        kind: SubscriptionType,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (user_id, subscription_type, usage_limit, is_active)
            VALUES ($1, $2, $3, TRUE)
            RETURNING id, user_id, subscription_type, usage_limit, is_active
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(kind.default_usage_limit())
        .fetch_one(executor)
        .await
    }

    /// Finds the subscription owned by a user
    ///
    /// Active subscriptions are preferred if several rows exist.
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, subscription_type, usage_limit, is_active
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY is_active DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Deletes every subscription owned by a user
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_by_user<'e, E>(executor: E, user_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
