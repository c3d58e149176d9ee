use thiserror::Error;

use fintrack_accounts::{Account, AccountSet};
use fintrack_core::{AccountId, Entity, EntryId, OwnerId};
use fintrack_ledger::{EntryFilter, LedgerEntry, Page};
use std::sync::Arc;

/// Storage failure. Never a rule violation: those are decided by the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("account {0} already exists")]
    DuplicateAccount(AccountId),

    #[error("owner isolation violated: {0}")]
    OwnerIsolation(String),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("async runtime unavailable: {0}")]
    Runtime(String),
}

/// Reject a write of something owned by anyone but the scope's owner.
pub(crate) fn ensure_owned<T: Entity>(owner_id: OwnerId, item: &T) -> Result<(), StoreError> {
    if item.belongs_to(owner_id) {
        Ok(())
    } else {
        Err(StoreError::OwnerIsolation(format!(
            "{} belongs to owner {}, scope is {owner_id}",
            item.id(),
            item.owner_id()
        )))
    }
}

/// Operations available inside one owner's atomic scope.
///
/// Everything read through a `LedgerTx` is protected against concurrent
/// writers for the same owner until the scope ends; everything written
/// becomes visible together, or not at all.
pub trait LedgerTx {
    /// All of the owner's accounts, held exclusively for the rest of the scope.
    ///
    /// `referenced` ids that exist but belong to another owner are reported
    /// as foreign in the returned set.
    fn lock_accounts(&mut self, referenced: &[AccountId]) -> Result<AccountSet, StoreError>;

    /// Persist the balance/debt of accounts previously returned by `lock_accounts`.
    fn save_accounts(&mut self, accounts: &[Account]) -> Result<(), StoreError>;

    fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError>;

    /// An entry of this scope's owner.
    fn find_entry(&mut self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError>;

    fn remove_entry(&mut self, id: EntryId) -> Result<(), StoreError>;

    /// Overwrite the free metadata of an existing entry.
    fn update_entry_metadata(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Every entry of the owner that references any of `account_ids`.
    fn entries_referencing(&mut self, account_ids: &[AccountId]) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Persistent home of accounts and ledger entries.
///
/// ## Atomic scope
///
/// `transact` runs `work` with exclusive access to one owner's accounts and
/// entries. If `work` returns `Ok`, every write it made commits at once; if it
/// returns `Err`, nothing it wrote is kept. Scopes of different owners never
/// contend.
///
/// Reads and writes of a batch both happen inside the same scope, so
/// validation always sees the balances it is about to overwrite.
pub trait LedgerStore: Send + Sync {
    fn transact<T, E, F>(&self, owner_id: OwnerId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>;

    /// Register an account created by the owning-resource layer.
    fn open_account(&self, account: Account) -> Result<(), StoreError>;

    /// Snapshot of the owner's accounts (no lock held afterwards).
    fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, StoreError>;

    fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn transact<T, E, F>(&self, owner_id: OwnerId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transact(owner_id, work)
    }

    fn open_account(&self, account: Account) -> Result<(), StoreError> {
        (**self).open_account(account)
    }

    fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, StoreError> {
        (**self).accounts(owner_id)
    }

    fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, StoreError> {
        (**self).list_entries(owner_id, filter)
    }
}
