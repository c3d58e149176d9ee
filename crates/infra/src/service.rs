//! Ledger service: the application-level pipeline around the pure engine.
//!
//! ```text
//! request
//!   ↓
//! 1. Open the owner's atomic scope (exclusive per owner)
//!   ↓
//! 2. Lock and load the owner's accounts
//!   ↓
//! 3. Plan / reconcile (pure, no IO)
//!   ↓
//! 4. Persist changed accounts + entries, commit
//!   ↓
//! 5. Publish a LedgerEvent (after commit only)
//! ```
//!
//! A rejected batch never reaches step 4, and the scope discards anything it
//! wrote, so the owner's state is exactly what it was before the request.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use fintrack_accounts::{Account, AccountSet};
use fintrack_core::{AccountId, EntryId, OwnerId, Role};
use fintrack_events::{EventBus, EventEnvelope};
use fintrack_ledger::{
    BatchContext, BatchError, EntryFilter, EntryMetadataPatch, LedgerEngine, LedgerEntry, LedgerError, LedgerEvent,
    OperationRequest, Page, Recomputed, reconcile_deletion, recompute_account,
};

use crate::config::LedgerConfig;
use crate::store::{LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A batch operation broke a rule; nothing was written.
    #[error(transparent)]
    Rejected(#[from] BatchError),

    /// A rule violation outside a batch (e.g. recompute of an unknown account).
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("entry {0} not found")]
    EntryNotFound(EntryId),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    /// The change committed, but the notification could not be handed off.
    #[error("notification publish failed: {0}")]
    Publish(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Rejected(e) => e.code(),
            ServiceError::Ledger(e) => e.code(),
            ServiceError::EntryNotFound(_) => "entry_not_found",
            ServiceError::Store(_) => "storage_error",
            ServiceError::Publish(_) => "publish_failed",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Rejected(e) => e.error.http_status(),
            ServiceError::Ledger(e) => e.http_status(),
            ServiceError::EntryNotFound(_) => 404,
            ServiceError::Store(_) | ServiceError::Publish(_) => 500,
        }
    }
}

/// Orchestrates batches, deletions and metadata edits for every owner.
///
/// `S` is the ledger store, `B` the notification bus. Both are injected so
/// tests run against `InMemoryLedgerStore` + `InMemoryEventBus`.
#[derive(Debug)]
pub struct LedgerService<S, B> {
    store: S,
    bus: B,
    config: LedgerConfig,
}

impl<S, B> LedgerService<S, B> {
    pub fn new(store: S, bus: B, config: LedgerConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    /// Register an account created by the owning-resource layer.
    #[instrument(skip(self, account), fields(owner_id = %account.owner_id, account_id = %account.id), err)]
    pub fn open_account(&self, account: Account) -> Result<(), ServiceError> {
        self.store.open_account(account)?;
        Ok(())
    }

    /// Apply `operations` for `owner_id` all-or-nothing.
    ///
    /// On success returns the created entries (pooled expenses may produce two
    /// entries for one operation). On the first violation returns
    /// `ServiceError::Rejected` carrying the operation index and nothing is
    /// written or published.
    #[instrument(skip(self, operations), fields(owner_id = %owner_id, role = %role, batch_len = operations.len()), err)]
    pub fn submit_batch(
        &self,
        owner_id: OwnerId,
        role: &Role,
        operations: &[OperationRequest],
    ) -> Result<Vec<LedgerEntry>, ServiceError> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.config.pool_for(role);
        let referenced: Vec<AccountId> = operations
            .iter()
            .flat_map(|op| [op.source_account_id, op.destination_account_id])
            .flatten()
            .collect();

        let (entries, changed) = self.store.transact(owner_id, |tx| -> Result<_, ServiceError> {
            let accounts = tx.lock_accounts(&referenced)?;
            let engine = LedgerEngine::new(BatchContext {
                owner_id,
                role,
                pool,
                now: Utc::now(),
            });
            let plan = engine.plan(&accounts, operations).inspect_err(|e| {
                warn!(index = e.index, code = e.code(), error = %e.error, "batch rejected");
            })?;

            let changed = plan.changed_accounts(&accounts);
            tx.save_accounts(&changed)?;
            tx.insert_entries(&plan.entries)?;
            Ok((plan.entries, changed))
        })?;

        info!(entries = entries.len(), accounts = changed.len(), "batch committed");

        self.publish(LedgerEvent::EntriesRecorded {
            owner_id,
            entries: entries.clone(),
            accounts: changed,
            occurred_at: Utc::now(),
        })?;
        Ok(entries)
    }

    /// Remove an entry and recompute every account it referenced, in one scope.
    ///
    /// Returns the reconciliation result per referenced account.
    #[instrument(skip(self), fields(owner_id = %owner_id, role = %role, entry_id = %entry_id), err)]
    pub fn delete_entry(&self, owner_id: OwnerId, role: &Role, entry_id: EntryId) -> Result<Vec<Recomputed>, ServiceError> {
        let pool = self.config.pool_for(role);

        let (entry, results, accounts) = self.store.transact(owner_id, |tx| -> Result<_, ServiceError> {
            // Accounts first, same lock order as `submit_batch`.
            let locked = tx.lock_accounts(&[])?;
            let entry = tx.find_entry(entry_id)?.ok_or(ServiceError::EntryNotFound(entry_id))?;
            tx.remove_entry(entry_id)?;

            let referenced = entry.account_ids();
            let remaining = tx.entries_referencing(&referenced)?;
            let mut staged = locked.clone();
            let results = reconcile_deletion(&mut staged, &entry, &remaining, pool)?;

            let recomputed: Vec<Account> = results
                .iter()
                .filter_map(|r| staged.get(r.account_id).cloned())
                .collect();
            tx.save_accounts(&recomputed)?;
            Ok((entry, results, recomputed))
        })?;

        info!(accounts = results.len(), "entry deleted and accounts reconciled");

        self.publish(LedgerEvent::EntryDeleted {
            owner_id,
            entry,
            recomputed: accounts,
            occurred_at: Utc::now(),
        })?;
        Ok(results)
    }

    /// Rebuild one account's balance/debt from its complete history.
    ///
    /// Idempotent: a second call with no intervening writes changes nothing.
    #[instrument(skip(self), fields(owner_id = %owner_id, role = %role, account_id = %account_id), err)]
    pub fn recompute_account(&self, owner_id: OwnerId, role: &Role, account_id: AccountId) -> Result<Recomputed, ServiceError> {
        let pool = self.config.pool_for(role);

        let result = self.store.transact(owner_id, |tx| -> Result<_, ServiceError> {
            let mut accounts = tx.lock_accounts(&[account_id])?;
            let Some(account) = accounts.get_mut(account_id) else {
                return Err(LedgerError::AccountNotFound(Some(account_id)).into());
            };
            let history = tx.entries_referencing(&[account_id])?;
            let result = recompute_account(account, &history, pool)?;

            if result.value != result.previous {
                account.set_tracked_value(result.value);
                let updated = account.clone();
                tx.save_accounts(&[updated])?;
            }
            Ok(result)
        })?;

        if result.value != result.previous {
            info!(previous = %result.previous, value = %result.value, "account recomputed");
        }
        Ok(result)
    }

    /// Change an entry's free metadata (description, category, date).
    #[instrument(skip(self, patch), fields(owner_id = %owner_id, entry_id = %entry_id), err)]
    pub fn annotate_entry(
        &self,
        owner_id: OwnerId,
        entry_id: EntryId,
        patch: &EntryMetadataPatch,
    ) -> Result<LedgerEntry, ServiceError> {
        let (entry, changed) = self.store.transact(owner_id, |tx| -> Result<_, ServiceError> {
            let mut entry = tx.find_entry(entry_id)?.ok_or(ServiceError::EntryNotFound(entry_id))?;
            if patch.is_empty() {
                return Ok((entry, false));
            }
            patch.apply_to(&mut entry);
            tx.update_entry_metadata(&entry)?;
            Ok((entry, true))
        })?;

        if changed {
            self.publish(LedgerEvent::EntryAnnotated {
                owner_id,
                entry: entry.clone(),
                occurred_at: Utc::now(),
            })?;
        }
        Ok(entry)
    }

    pub fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, ServiceError> {
        Ok(self.store.list_entries(owner_id, filter)?)
    }

    pub fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, ServiceError> {
        Ok(self.store.accounts(owner_id)?)
    }

    fn publish(&self, event: LedgerEvent) -> Result<(), ServiceError> {
        let envelope = EventEnvelope::wrap(event);
        let owner_id = envelope.owner_id();
        self.bus.publish(envelope).map_err(|e| {
            warn!(owner_id = %owner_id, error = ?e, "publish failed after commit");
            ServiceError::Publish(format!("{e:?}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_codes_follow_the_cause() {
        let rejected = ServiceError::from(BatchError::new(1, LedgerError::SameAccountTransfer(AccountId::new())));
        assert_eq!(rejected.code(), "same_account_transfer");
        assert_eq!(rejected.http_status(), 400);

        let missing = ServiceError::EntryNotFound(EntryId::new());
        assert_eq!(missing.code(), "entry_not_found");
        assert_eq!(missing.http_status(), 404);

        let store = ServiceError::from(StoreError::Poisoned("x".to_string()));
        assert_eq!(store.code(), "storage_error");
        assert_eq!(store.http_status(), 500);
    }
}
