/// PostgreSQL [`AccountStore`]
///
/// Sessions wrap a `sqlx` transaction taken from the pool. The topology probe
/// reads `version()` and `pg_is_in_recovery()`; a server in recovery (hot
/// standby) is reported as lacking transaction support. Deployments behind
/// a statement-mode pooler, where a transaction cannot span several
/// statements, set [`TransactionMode::Disabled`].
///
/// Dropping a [`PgSession`] whose transaction is still open rolls it back.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::account::store::{AccountStore, StoreError, Topology};
use crate::models::{api_key::ApiKey, subscription::Subscription, user::User};

/// Whether the store may use transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Decide from the server's state
    #[default]
    Auto,

    /// Never open transactions
    Disabled,
}

impl std::str::FromStr for TransactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TransactionMode::Auto),
            "disabled" | "off" | "false" => Ok(TransactionMode::Disabled),
            other => Err(format!(
                "invalid transaction mode '{}', expected 'auto' or 'disabled'",
                other
            )),
        }
    }
}

/// Account store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    mode: TransactionMode,
}

/// Open transaction owned by one deletion
#[derive(Debug)]
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::SessionClosed)
    }
}

impl PgAccountStore {
    pub fn new(pool: PgPool, mode: TransactionMode) -> Self {
        Self { pool, mode }
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    type Session = PgSession;

    async fn probe_topology(&self) -> Result<Option<Topology>, StoreError> {
        let (version, in_recovery): (String, bool) =
            sqlx::query_as("SELECT version(), pg_is_in_recovery()")
                .fetch_one(&self.pool)
                .await?;

        let topology = match self.mode {
            TransactionMode::Disabled => Topology::standalone(version),
            TransactionMode::Auto if in_recovery => Topology::standalone(version),
            TransactionMode::Auto => Topology::transactional(version),
        };

        debug!(
            server = %topology.server,
            in_recovery,
            supports_transactions = topology.supports_transactions,
            "Probed database topology"
        );

        Ok(Some(topology))
    }

    async fn begin_session(&self) -> Result<PgSession, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx: Some(tx) })
    }

    async fn find_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut PgSession>,
    ) -> Result<Option<User>, StoreError> {
        let user = match session {
            Some(session) => User::find_by_id(&mut **session.tx()?, user_id).await?,
            None => User::find_by_id(&self.pool, user_id).await?,
        };
        Ok(user)
    }

    async fn delete_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut PgSession>,
    ) -> Result<bool, StoreError> {
        let deleted = match session {
            Some(session) => User::delete(&mut **session.tx()?, user_id).await?,
            None => User::delete(&self.pool, user_id).await?,
        };
        Ok(deleted)
    }

    async fn delete_subscriptions_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut PgSession>,
    ) -> Result<u64, StoreError> {
        let deleted = match session {
            Some(session) => Subscription::delete_by_user(&mut **session.tx()?, user_id).await?,
            None => Subscription::delete_by_user(&self.pool, user_id).await?,
        };
        Ok(deleted)
    }

    async fn delete_keys_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut PgSession>,
    ) -> Result<u64, StoreError> {
        let deleted = match session {
            Some(session) => ApiKey::delete_by_user(&mut **session.tx()?, user_id).await?,
            None => ApiKey::delete_by_user(&self.pool, user_id).await?,
        };
        Ok(deleted)
    }

    async fn commit(&self, session: &mut PgSession) -> Result<(), StoreError> {
        let tx = session.tx.take().ok_or(StoreError::SessionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn abort(&self, session: &mut PgSession) -> Result<(), StoreError> {
        let tx = session.tx.take().ok_or(StoreError::SessionClosed)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn end_session(&self, session: PgSession) {
        if session.tx.is_some() {
            debug!("Releasing session with an open transaction, rolling back");
        }
        drop(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_mode_parse() {
        assert_eq!("auto".parse::<TransactionMode>().unwrap(), TransactionMode::Auto);
        assert_eq!(
            "Disabled".parse::<TransactionMode>().unwrap(),
            TransactionMode::Disabled
        );
        assert_eq!("off".parse::<TransactionMode>().unwrap(), TransactionMode::Disabled);
        assert!("sometimes".parse::<TransactionMode>().is_err());
    }

    #[test]
    fn test_default_mode_is_auto() {
        assert_eq!(TransactionMode::default(), TransactionMode::Auto);
    }
}
