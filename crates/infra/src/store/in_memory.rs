use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use fintrack_accounts::{Account, AccountSet};
use fintrack_core::{AccountId, EntryId, OwnerId};
use fintrack_ledger::{EntryFilter, LedgerEntry, Page};

use super::r#trait::{LedgerStore, LedgerTx, StoreError, ensure_owned};

#[derive(Debug, Default, Clone)]
struct OwnerBook {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, LedgerEntry>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Each owner's book sits behind its own mutex, which
/// is held for the whole atomic scope; work runs against a staged copy that is
/// written back only when the scope succeeds.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    books: RwLock<HashMap<OwnerId, Arc<Mutex<OwnerBook>>>>,
    /// Owner of every account ever opened, for cross-owner detection.
    account_owners: RwLock<HashMap<AccountId, OwnerId>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, owner_id: OwnerId) -> Result<Arc<Mutex<OwnerBook>>, StoreError> {
        {
            let books = self.books.read().map_err(|_| poisoned("books"))?;
            if let Some(book) = books.get(&owner_id) {
                return Ok(Arc::clone(book));
            }
        }
        let mut books = self.books.write().map_err(|_| poisoned("books"))?;
        Ok(Arc::clone(books.entry(owner_id).or_default()))
    }

    /// Read-path lookup; never creates a book.
    fn existing_book(&self, owner_id: OwnerId) -> Result<Option<Arc<Mutex<OwnerBook>>>, StoreError> {
        let books = self.books.read().map_err(|_| poisoned("books"))?;
        Ok(books.get(&owner_id).map(Arc::clone))
    }

    #[cfg(test)]
    fn owner_count(&self) -> Result<usize, StoreError> {
        Ok(self.books.read().map_err(|_| poisoned("books"))?.len())
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Poisoned(format!("{what} lock poisoned"))
}

struct InMemoryTx<'a> {
    owner_id: OwnerId,
    staged: OwnerBook,
    account_owners: &'a RwLock<HashMap<AccountId, OwnerId>>,
}

impl LedgerTx for InMemoryTx<'_> {
    fn lock_accounts(&mut self, referenced: &[AccountId]) -> Result<AccountSet, StoreError> {
        let owners = self.account_owners.read().map_err(|_| poisoned("account index"))?;
        let foreign: Vec<AccountId> = referenced
            .iter()
            .copied()
            .filter(|id| owners.get(id).is_some_and(|owner| *owner != self.owner_id))
            .collect();

        let set = AccountSet::new(self.owner_id, self.staged.accounts.values().cloned())
            .map_err(|e| StoreError::OwnerIsolation(e.to_string()))?;
        Ok(set.with_foreign(foreign))
    }

    fn save_accounts(&mut self, accounts: &[Account]) -> Result<(), StoreError> {
        for account in accounts {
            ensure_owned(self.owner_id, account)?;
            let Some(slot) = self.staged.accounts.get_mut(&account.id) else {
                return Err(StoreError::InvalidAccount(format!("account {} was never opened", account.id)));
            };
            *slot = account.clone();
        }
        Ok(())
    }

    fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        for entry in entries {
            ensure_owned(self.owner_id, entry)?;
            self.staged.entries.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    fn find_entry(&mut self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.staged.entries.get(&id).cloned())
    }

    fn remove_entry(&mut self, id: EntryId) -> Result<(), StoreError> {
        self.staged.entries.remove(&id);
        Ok(())
    }

    fn update_entry_metadata(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        ensure_owned(self.owner_id, entry)?;
        if let Some(stored) = self.staged.entries.get_mut(&entry.id) {
            stored.description = entry.description.clone();
            stored.category = entry.category.clone();
            stored.occurred_at = entry.occurred_at;
        }
        Ok(())
    }

    fn entries_referencing(&mut self, account_ids: &[AccountId]) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .staged
            .entries
            .values()
            .filter(|e| account_ids.iter().any(|id| e.references(*id)))
            .cloned()
            .collect())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn transact<T, E, F>(&self, owner_id: OwnerId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let book = self.book(owner_id)?;
        let mut guard = book.lock().map_err(|_| poisoned("owner book"))?;

        let mut tx = InMemoryTx {
            owner_id,
            staged: guard.clone(),
            account_owners: &self.account_owners,
        };
        let out = work(&mut tx)?;

        *guard = tx.staged;
        Ok(out)
    }

    fn open_account(&self, account: Account) -> Result<(), StoreError> {
        account
            .validate()
            .map_err(|e| StoreError::InvalidAccount(e.to_string()))?;

        // Book before index, same order as `transact`.
        let book = self.book(account.owner_id)?;
        let mut guard = book.lock().map_err(|_| poisoned("owner book"))?;
        let mut owners = self.account_owners.write().map_err(|_| poisoned("account index"))?;

        if owners.contains_key(&account.id) {
            return Err(StoreError::DuplicateAccount(account.id));
        }
        owners.insert(account.id, account.owner_id);
        guard.accounts.insert(account.id, account);
        Ok(())
    }

    fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, StoreError> {
        let Some(book) = self.existing_book(owner_id)? else {
            return AccountSet::new(owner_id, []).map_err(|e| StoreError::OwnerIsolation(e.to_string()));
        };
        let guard = book.lock().map_err(|_| poisoned("owner book"))?;
        AccountSet::new(owner_id, guard.accounts.values().cloned()).map_err(|e| StoreError::OwnerIsolation(e.to_string()))
    }

    fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, StoreError> {
        let Some(book) = self.existing_book(owner_id)? else {
            return Ok(filter.paginate(std::iter::empty::<&LedgerEntry>()));
        };
        let guard = book.lock().map_err(|_| poisoned("owner book"))?;
        Ok(filter.paginate(guard.entries.values()))
    }
}
