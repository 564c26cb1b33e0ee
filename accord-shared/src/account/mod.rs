/// Account lifecycle
///
/// - [`store`]: the [`AccountStore`] seam and [`StoreError`]
/// - [`deletion`]: the [`AccountDeletion`] coordinator
/// - [`memory`]: an in-process store
///
/// The PostgreSQL store lives in [`crate::db::account_store`].

pub mod deletion;
pub mod memory;
pub mod store;

pub use deletion::{
    AccountDeleter, AccountDeletion, DeleteAccountError, DeletionMode, DeletionOutcome,
    DeletionPath, DeletionReport, DeletionStep,
};
pub use store::{AccountStore, StoreError, StoreOperation, Topology};
