/// Storage seam used by the account deletion coordinator
///
/// An [`AccountStore`] exposes exactly the calls the deletion cascade needs.
/// Every data call takes an optional session; `None` runs the statement on
/// its own, `Some` binds it to the open transaction.
///
/// Sessions are owned values. [`AccountStore::end_session`] consumes the
/// session, so a session cannot be released twice, and implementations
/// release anything still held when a session is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::User;

/// Storage-layer failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database driver error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session was used after commit or abort
    #[error("session already finished")]
    SessionClosed,

    /// Any other backend failure
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Individual store calls, used for logging and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    ProbeTopology,
    BeginSession,
    FindUser,
    DeleteUser,
    DeleteSubscriptions,
    DeleteKeys,
    Commit,
    Abort,
}

impl std::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreOperation::ProbeTopology => "probe_topology",
            StoreOperation::BeginSession => "begin_session",
            StoreOperation::FindUser => "find_user",
            StoreOperation::DeleteUser => "delete_user",
            StoreOperation::DeleteSubscriptions => "delete_subscriptions",
            StoreOperation::DeleteKeys => "delete_keys",
            StoreOperation::Commit => "commit",
            StoreOperation::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// What the backend reported about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Server description (version string or store name)
    pub server: String,

    /// Whether multi-statement transactions can span the cascade
    pub supports_transactions: bool,
}

impl Topology {
    /// Topology that supports transactions
    pub fn transactional(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            supports_transactions: true,
        }
    }

    /// Topology without transaction support
    pub fn standalone(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            supports_transactions: false,
        }
    }
}

/// Backend operations used by [`super::AccountDeletion`]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Transaction handle owned by a single deletion
    type Session: Send;

    /// Asks the backend whether transactions are available
    ///
    /// `Ok(None)` means the backend could not tell.
    async fn probe_topology(&self) -> Result<Option<Topology>, StoreError>;

    /// Opens a session with a transaction started on it
    async fn begin_session(&self) -> Result<Self::Session, StoreError>;

    async fn find_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut Self::Session>,
    ) -> Result<Option<User>, StoreError>;

    /// Returns whether a user row was removed
    async fn delete_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut Self::Session>,
    ) -> Result<bool, StoreError>;

    /// Returns the number of removed subscriptions
    async fn delete_subscriptions_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut Self::Session>,
    ) -> Result<u64, StoreError>;

    /// Returns the number of removed API keys
    async fn delete_keys_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut Self::Session>,
    ) -> Result<u64, StoreError>;

    async fn commit(&self, session: &mut Self::Session) -> Result<(), StoreError>;

    async fn abort(&self, session: &mut Self::Session) -> Result<(), StoreError>;

    /// Releases the session
    async fn end_session(&self, session: Self::Session);
}
