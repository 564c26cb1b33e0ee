/// In-process [`AccountStore`]
///
/// Keeps users, subscriptions and API keys in memory behind a tokio mutex.
/// A session records the deletions it made without touching the shared
/// data. Commit applies those deletions to the shared data as it is at
/// commit time, so overlapping sessions and writes made outside a session
/// are never lost. Abort discards the recorded deletions.
///
/// The store can be told what topology to report and which operations to
/// fail, and it counts sessions and mutations so callers can check that
/// every session is released exactly once.
///
/// # Example
///
/// ```
/// use accord_shared::account::memory::{MemoryAccountStore, TopologyAnswer};
/// use accord_shared::account::{AccountDeletion, StoreOperation};
/// use uuid::Uuid;
///
/// # async fn example() {
/// let store = MemoryAccountStore::new(TopologyAnswer::Transactional);
/// let user_id = Uuid::new_v4();
/// store.add_user(user_id, "ada@example.com").await;
/// store.add_key(user_id, "Reporting").await;
/// store.fail_on(StoreOperation::DeleteKeys).await;
///
/// let accounts = AccountDeletion::new(store.clone());
/// assert!(accounts.delete_account(user_id).await.is_err());
/// assert!(store.has_user(user_id).await);
/// # }
/// ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{AccountStore, StoreError, StoreOperation, Topology};
use crate::auth::api_key::{display_prefix, generate_api_key};
use crate::models::{
    api_key::ApiKey,
    subscription::{Subscription, SubscriptionType},
    user::User,
};

const SERVER_NAME: &str = "memory";

/// Answer given to `probe_topology`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyAnswer {
    /// Transactions supported
    Transactional,

    /// Known to lack transactions
    Standalone,

    /// Probe succeeds without an answer
    Indeterminate,

    /// Probe itself fails
    ProbeFails,
}

/// Counters kept by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub sessions_opened: u64,
    pub sessions_released: u64,
    pub end_session_calls: u64,
    pub commits: u64,
    pub aborts: u64,
    /// Delete calls, whether or not they succeeded
    pub mutation_calls: u64,
}

#[derive(Debug, Clone, Default)]
struct Data {
    users: HashMap<Uuid, User>,
    subscriptions: Vec<Subscription>,
    keys: Vec<ApiKey>,
}

impl Data {
    fn remove_user(&mut self, user_id: Uuid) -> bool {
        self.users.remove(&user_id).is_some()
    }

    fn remove_subscriptions(&mut self, user_id: Uuid) -> u64 {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.user_id != user_id);
        (before - self.subscriptions.len()) as u64
    }

    fn remove_keys(&mut self, user_id: Uuid) -> u64 {
        let before = self.keys.len();
        self.keys.retain(|k| k.user_id != user_id);
        (before - self.keys.len()) as u64
    }
}

/// Deletions made inside a session, keyed by user id
#[derive(Debug, Default)]
struct Pending {
    users: HashSet<Uuid>,
    subscriptions_of: HashSet<Uuid>,
    keys_of: HashSet<Uuid>,
}

impl Pending {
    fn apply(self, data: &mut Data) {
        for user_id in self.users {
            data.remove_user(user_id);
        }
        for user_id in self.subscriptions_of {
            data.remove_subscriptions(user_id);
        }
        for user_id in self.keys_of {
            data.remove_keys(user_id);
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sessions_opened: AtomicU64,
    sessions_released: AtomicU64,
    end_session_calls: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
    mutation_calls: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    data: Mutex<Data>,
    topology: Mutex<TopologyAnswer>,
    faults: Mutex<HashSet<StoreOperation>>,
    counters: Arc<Counters>,
}

/// In-memory account store; clones share the same data
#[derive(Debug, Clone)]
pub struct MemoryAccountStore {
    inner: Arc<Inner>,
}

/// Session of a [`MemoryAccountStore`]
#[derive(Debug)]
pub struct MemorySession {
    pending: Option<Pending>,
    counters: Arc<Counters>,
}

impl MemorySession {
    fn pending(&mut self) -> Result<&mut Pending, StoreError> {
        self.pending.as_mut().ok_or(StoreError::SessionClosed)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.counters.sessions_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl MemoryAccountStore {
    pub fn new(topology: TopologyAnswer) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: Mutex::new(Data::default()),
                topology: Mutex::new(topology),
                faults: Mutex::new(HashSet::new()),
                counters: Arc::new(Counters::default()),
            }),
        }
    }

    pub async fn set_topology(&self, topology: TopologyAnswer) {
        *self.inner.topology.lock().await = topology;
    }

    /// Makes every later call of `operation` fail
    pub async fn fail_on(&self, operation: StoreOperation) {
        self.inner.faults.lock().await.insert(operation);
    }

    pub async fn clear_faults(&self) {
        self.inner.faults.lock().await.clear();
    }

    async fn check_fault(&self, operation: StoreOperation) -> Result<(), StoreError> {
        if self.inner.faults.lock().await.contains(&operation) {
            return Err(StoreError::Backend(format!("injected fault in {}", operation)));
        }
        Ok(())
    }

    fn count_mutation(&self) {
        self.inner.counters.mutation_calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let c = &self.inner.counters;
        MemoryStoreStats {
            sessions_opened: c.sessions_opened.load(Ordering::SeqCst),
            sessions_released: c.sessions_released.load(Ordering::SeqCst),
            end_session_calls: c.end_session_calls.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            aborts: c.aborts.load(Ordering::SeqCst),
            mutation_calls: c.mutation_calls.load(Ordering::SeqCst),
        }
    }

    /// Inserts a verified, non-admin user
    pub async fn add_user(&self, user_id: Uuid, email: &str) {
        let now = Utc::now();
        let user = User {
            id: user_id,
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            password_hash: String::new(),
            is_verified: true,
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        self.inner.data.lock().await.users.insert(user_id, user);
    }

    /// Inserts a free subscription for `user_id` and returns its id
    pub async fn add_subscription(&self, user_id: Uuid) -> Uuid {
        let kind = SubscriptionType::Free;
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            subscription_type: kind.as_str().to_string(),
            usage_limit: kind.default_usage_limit(),
            is_active: true,
        };
        let id = subscription.id;
        self.inner.data.lock().await.subscriptions.push(subscription);
        id
    }

    /// Inserts an API key for `user_id` and returns its id
    pub async fn add_key(&self, user_id: Uuid, description: &str) -> Uuid {
        let (plaintext, key_hash) = generate_api_key();
        let now = Utc::now();
        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id,
            description: description.to_string(),
            key_prefix: display_prefix(&plaintext),
            key_hash,
            created_at: now,
            updated_at: now,
        };
        let id = key.id;
        self.inner.data.lock().await.keys.push(key);
        id
    }

    pub async fn has_user(&self, user_id: Uuid) -> bool {
        self.inner.data.lock().await.users.contains_key(&user_id)
    }

    pub async fn subscription_count(&self, user_id: Uuid) -> usize {
        let data = self.inner.data.lock().await;
        data.subscriptions.iter().filter(|s| s.user_id == user_id).count()
    }

    pub async fn key_count(&self, user_id: Uuid) -> usize {
        let data = self.inner.data.lock().await;
        data.keys.iter().filter(|k| k.user_id == user_id).count()
    }

    /// User row plus dependents that reference `user_id`
    pub async fn references_to(&self, user_id: Uuid) -> usize {
        usize::from(self.has_user(user_id).await)
            + self.subscription_count(user_id).await
            + self.key_count(user_id).await
    }

    /// Total number of records of every kind
    pub async fn record_count(&self) -> usize {
        let data = self.inner.data.lock().await;
        data.users.len() + data.subscriptions.len() + data.keys.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    type Session = MemorySession;

    async fn probe_topology(&self) -> Result<Option<Topology>, StoreError> {
        self.check_fault(StoreOperation::ProbeTopology).await?;

        match *self.inner.topology.lock().await {
            TopologyAnswer::Transactional => Ok(Some(Topology::transactional(SERVER_NAME))),
            TopologyAnswer::Standalone => Ok(Some(Topology::standalone(SERVER_NAME))),
            TopologyAnswer::Indeterminate => Ok(None),
            TopologyAnswer::ProbeFails => {
                Err(StoreError::Backend("topology probe failed".to_string()))
            }
        }
    }

    async fn begin_session(&self) -> Result<MemorySession, StoreError> {
        self.check_fault(StoreOperation::BeginSession).await?;

        self.inner.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);

        Ok(MemorySession {
            pending: Some(Pending::default()),
            counters: Arc::clone(&self.inner.counters),
        })
    }

    async fn find_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut MemorySession>,
    ) -> Result<Option<User>, StoreError> {
        self.check_fault(StoreOperation::FindUser).await?;

        let hidden = match session {
            Some(session) => session.pending()?.users.contains(&user_id),
            None => false,
        };
        if hidden {
            return Ok(None);
        }

        Ok(self.inner.data.lock().await.users.get(&user_id).cloned())
    }

    async fn delete_user_by_id(
        &self,
        user_id: Uuid,
        session: Option<&mut MemorySession>,
    ) -> Result<bool, StoreError> {
        self.count_mutation();
        self.check_fault(StoreOperation::DeleteUser).await?;

        let mut data = self.inner.data.lock().await;
        match session {
            Some(session) => {
                let pending = session.pending()?;
                let present = data.users.contains_key(&user_id)
                    && !pending.users.contains(&user_id);
                if present {
                    pending.users.insert(user_id);
                }
                Ok(present)
            }
            None => Ok(data.remove_user(user_id)),
        }
    }

    async fn delete_subscriptions_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut MemorySession>,
    ) -> Result<u64, StoreError> {
        self.count_mutation();
        self.check_fault(StoreOperation::DeleteSubscriptions).await?;

        let mut data = self.inner.data.lock().await;
        match session {
            Some(session) => {
                let pending = session.pending()?;
                if !pending.subscriptions_of.insert(user_id) {
                    return Ok(0);
                }
                Ok(data.subscriptions.iter().filter(|s| s.user_id == user_id).count() as u64)
            }
            None => Ok(data.remove_subscriptions(user_id)),
        }
    }

    async fn delete_keys_by_user(
        &self,
        user_id: Uuid,
        session: Option<&mut MemorySession>,
    ) -> Result<u64, StoreError> {
        self.count_mutation();
        self.check_fault(StoreOperation::DeleteKeys).await?;

        let mut data = self.inner.data.lock().await;
        match session {
            Some(session) => {
                let pending = session.pending()?;
                if !pending.keys_of.insert(user_id) {
                    return Ok(0);
                }
                Ok(data.keys.iter().filter(|k| k.user_id == user_id).count() as u64)
            }
            None => Ok(data.remove_keys(user_id)),
        }
    }

    async fn commit(&self, session: &mut MemorySession) -> Result<(), StoreError> {
        self.check_fault(StoreOperation::Commit).await?;

        let pending = session.pending.take().ok_or(StoreError::SessionClosed)?;
        pending.apply(&mut *self.inner.data.lock().await);
        self.inner.counters.commits.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn abort(&self, session: &mut MemorySession) -> Result<(), StoreError> {
        self.inner.counters.aborts.fetch_add(1, Ordering::SeqCst);
        session.pending.take().ok_or(StoreError::SessionClosed)?;
        self.check_fault(StoreOperation::Abort).await
    }

    async fn end_session(&self, session: MemorySession) {
        self.inner
            .counters
            .end_session_calls
            .fetch_add(1, Ordering::SeqCst);
        drop(session);
    }
}
