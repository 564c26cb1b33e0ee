/// Account deletion cascade
///
/// Deleting an account removes the user row, then every subscription that
/// references it, then every API key that references it. A subscription or
/// key must never outlive its user.
///
/// # Modes
///
/// Before touching any data the coordinator asks the store for its topology
/// and picks a [`DeletionMode`]:
///
/// - [`DeletionMode::Transactional`]: all three deletes run inside one
///   session. Any failure aborts the session, nothing is visible, and the
///   caller gets [`DeleteAccountError::TransactionAborted`].
/// - [`DeletionMode::Direct`]: the three deletes run one after another
///   with no atomicity. A failure after the user row is gone leaves the
///   remaining dependents in place and is reported as
///   [`DeleteAccountError::PartialDeletion`]. Completed deletes are not
///   compensated.
///
/// A probe that fails or cannot answer selects the direct mode. The
/// coordinator never retries.
///
/// # Example
///
/// ```no_run
/// use accord_shared::account::{AccountDeletion, DeletionOutcome};
/// use accord_shared::db::account_store::{PgAccountStore, TransactionMode};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let accounts = AccountDeletion::new(PgAccountStore::new(pool, TransactionMode::Auto));
///
/// match accounts.delete_account(user_id).await? {
///     DeletionOutcome::Committed(report) => println!("removed {} keys", report.keys_deleted),
///     DeletionOutcome::NotFound => println!("no such account"),
/// }
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{AccountStore, StoreError};

/// Mode chosen for one deletion, carrying the session when there is one
pub enum DeletionMode<S> {
    /// Cascade bound to an open session
    Transactional(S),

    /// Cascade issued as independent statements
    Direct,
}

impl<S> DeletionMode<S> {
    pub fn path(&self) -> DeletionPath {
        match self {
            DeletionMode::Transactional(_) => DeletionPath::Transactional,
            DeletionMode::Direct => DeletionPath::Direct,
        }
    }
}

impl<S> std::fmt::Debug for DeletionMode<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeletionMode").field(&self.path()).finish()
    }
}

/// Label of the mode a deletion ran in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPath {
    Transactional,
    Direct,
}

impl std::fmt::Display for DeletionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionPath::Transactional => f.write_str("transactional"),
            DeletionPath::Direct => f.write_str("direct"),
        }
    }
}

/// One delete in the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStep {
    User,
    Subscriptions,
    Keys,
}

impl std::fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletionStep::User => f.write_str("user"),
            DeletionStep::Subscriptions => f.write_str("subscriptions"),
            DeletionStep::Keys => f.write_str("keys"),
        }
    }
}

/// Summary of a committed deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    pub user_id: Uuid,
    pub subscriptions_deleted: u64,
    pub keys_deleted: u64,
    pub mode: DeletionPath,
}

/// Non-error results of [`AccountDeletion::delete_account`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// User and all dependents are gone
    Committed(DeletionReport),

    /// No such user; nothing was changed
    NotFound,
}

/// Failures of [`AccountDeletion::delete_account`]
#[derive(Debug, thiserror::Error)]
pub enum DeleteAccountError {
    /// Transactional cascade failed and was rolled back
    #[error("account deletion aborted, no changes were made: {source}")]
    TransactionAborted {
        #[source]
        source: StoreError,
    },

    /// Direct cascade failed after removing some records
    #[error(
        "account {user_id} partially deleted ({} removed, {failed} failed): {source}",
        join_steps(.completed)
    )]
    PartialDeletion {
        user_id: Uuid,
        completed: Vec<DeletionStep>,
        failed: DeletionStep,
        #[source]
        source: StoreError,
    },

    /// Store failed before anything was removed
    #[error("account storage unavailable: {source}")]
    StorageUnavailable {
        #[source]
        source: StoreError,
    },
}

fn join_steps(steps: &[DeletionStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Object-safe handle on the coordinator, for callers that should not
/// name the store type
#[async_trait]
pub trait AccountDeleter: Send + Sync {
    async fn delete_account(&self, user_id: Uuid) -> Result<DeletionOutcome, DeleteAccountError>;
}

/// Account deletion coordinator
pub struct AccountDeletion<S> {
    store: S,
}

impl<S: AccountStore> AccountDeletion<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Probes the store and opens a session when transactions are available
    ///
    /// # Errors
    ///
    /// [`DeleteAccountError::StorageUnavailable`] when the store reports
    /// transaction support but the session cannot be opened.
    pub async fn select_mode(&self) -> Result<DeletionMode<S::Session>, DeleteAccountError> {
        let topology = match self.store.probe_topology().await {
            Ok(Some(topology)) => topology,
            Ok(None) => {
                debug!("Store topology indeterminate, deleting without a transaction");
                return Ok(DeletionMode::Direct);
            }
            Err(e) => {
                warn!(error = %e, "Store topology probe failed, deleting without a transaction");
                return Ok(DeletionMode::Direct);
            }
        };

        if !topology.supports_transactions {
            debug!(server = %topology.server, "Store has no transaction support");
            return Ok(DeletionMode::Direct);
        }

        let session = self
            .store
            .begin_session()
            .await
            .map_err(|source| DeleteAccountError::StorageUnavailable { source })?;

        Ok(DeletionMode::Transactional(session))
    }

    /// Deletes a user and every subscription and API key referencing it
    pub async fn delete_account(
        &self,
        user_id: Uuid,
    ) -> Result<DeletionOutcome, DeleteAccountError> {
        let result = match self.select_mode().await? {
            DeletionMode::Transactional(mut session) => {
                let result = self.delete_in_session(user_id, &mut session).await;
                self.store.end_session(session).await;
                result
            }
            DeletionMode::Direct => self.delete_direct(user_id).await,
        };

        match &result {
            Ok(DeletionOutcome::Committed(report)) => info!(
                user_id = %user_id,
                mode = %report.mode,
                subscriptions_deleted = report.subscriptions_deleted,
                keys_deleted = report.keys_deleted,
                "Account deleted"
            ),
            Ok(DeletionOutcome::NotFound) => debug!(user_id = %user_id, "Account not found"),
            Err(e) => warn!(user_id = %user_id, error = %e, "Account deletion failed"),
        }

        result
    }

    async fn delete_in_session(
        &self,
        user_id: Uuid,
        session: &mut S::Session,
    ) -> Result<DeletionOutcome, DeleteAccountError> {
        let report = match self.cascade_in_session(user_id, session).await {
            Ok(report) => report,
            Err(source) => {
                self.abort(session).await;
                return Err(DeleteAccountError::TransactionAborted { source });
            }
        };

        let Some(report) = report else {
            self.abort(session).await;
            return Ok(DeletionOutcome::NotFound);
        };

        self.store
            .commit(session)
            .await
            .map_err(|source| DeleteAccountError::TransactionAborted { source })?;

        Ok(DeletionOutcome::Committed(report))
    }

    /// `Ok(None)` when the user does not exist
    async fn cascade_in_session(
        &self,
        user_id: Uuid,
        session: &mut S::Session,
    ) -> Result<Option<DeletionReport>, StoreError> {
        if self
            .store
            .find_user_by_id(user_id, Some(&mut *session))
            .await?
            .is_none()
        {
            return Ok(None);
        }

        if !self
            .store
            .delete_user_by_id(user_id, Some(&mut *session))
            .await?
        {
            return Ok(None);
        }

        let subscriptions_deleted = self
            .store
            .delete_subscriptions_by_user(user_id, Some(&mut *session))
            .await?;

        let keys_deleted = self
            .store
            .delete_keys_by_user(user_id, Some(&mut *session))
            .await?;

        Ok(Some(DeletionReport {
            user_id,
            subscriptions_deleted,
            keys_deleted,
            mode: DeletionPath::Transactional,
        }))
    }

    async fn abort(&self, session: &mut S::Session) {
        if let Err(e) = self.store.abort(session).await {
            warn!(error = %e, "Failed to abort account deletion session");
        }
    }

    async fn delete_direct(&self, user_id: Uuid) -> Result<DeletionOutcome, DeleteAccountError> {
        let unavailable = |source| DeleteAccountError::StorageUnavailable { source };

        if self
            .store
            .find_user_by_id(user_id, None)
            .await
            .map_err(unavailable)?
            .is_none()
        {
            return Ok(DeletionOutcome::NotFound);
        }

        if !self
            .store
            .delete_user_by_id(user_id, None)
            .await
            .map_err(unavailable)?
        {
            return Ok(DeletionOutcome::NotFound);
        }

        let partial = |completed: &[DeletionStep], failed, source| {
            DeleteAccountError::PartialDeletion {
                user_id,
                completed: completed.to_vec(),
                failed,
                source,
            }
        };

        let subscriptions_deleted = self
            .store
            .delete_subscriptions_by_user(user_id, None)
            .await
            .map_err(|e| partial(&[DeletionStep::User], DeletionStep::Subscriptions, e))?;

        let keys_deleted = self
            .store
            .delete_keys_by_user(user_id, None)
            .await
            .map_err(|e| {
                partial(
                    &[DeletionStep::User, DeletionStep::Subscriptions],
                    DeletionStep::Keys,
                    e,
                )
            })?;

        Ok(DeletionOutcome::Committed(DeletionReport {
            user_id,
            subscriptions_deleted,
            keys_deleted,
            mode: DeletionPath::Direct,
        }))
    }
}

#[async_trait]
impl<S> AccountDeleter for AccountDeletion<S>
where
    S: AccountStore + 'static,
{
    async fn delete_account(&self, user_id: Uuid) -> Result<DeletionOutcome, DeleteAccountError> {
        AccountDeletion::delete_account(self, user_id).await
    }
}
