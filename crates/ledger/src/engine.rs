//! Batch planning: validate operations and stage their mutations.
//!
//! The engine never touches storage. It receives one owner's accounts, as
//! read under lock by the caller, validates every operation against a staged
//! copy that already reflects the earlier operations of the same batch, and
//! returns either the complete plan or the first violation. A rejected batch
//! leaves the caller's accounts untouched, so discarding the plan is all the
//! rollback there is.

use chrono::{DateTime, Utc};
use tracing::debug;

use fintrack_accounts::{Account, AccountLookup, AccountSet, Ledgered, PoolConfig, PoolRole};
use fintrack_core::{AccountId, EntryId, Money, OwnerId, Role};

use crate::entry::{EntryKind, EntryStatus, LedgerEntry, non_blank};
use crate::error::{BatchError, LedgerError};
use crate::operation::OperationRequest;

pub const CATEGORY_OTHER: &str = "Other";
pub const CATEGORY_TRANSFER: &str = "Transfer";

/// Who is submitting, and the pool (if any) their role allocates against.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub owner_id: OwnerId,
    pub role: &'a Role,
    pub pool: Option<&'a PoolConfig>,
    /// Logical timestamp shared by every entry that does not carry its own.
    pub now: DateTime<Utc>,
}

/// Outcome of a valid batch: entries to append and the final account state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub entries: Vec<LedgerEntry>,
    pub accounts: AccountSet,
}

impl BatchPlan {
    /// Accounts whose balance or debt the batch changed.
    pub fn changed_accounts(&self, baseline: &AccountSet) -> Vec<Account> {
        self.accounts.changed_since(baseline).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerEngine<'a> {
    ctx: BatchContext<'a>,
}

impl<'a> LedgerEngine<'a> {
    pub fn new(ctx: BatchContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn plan(&self, accounts: &AccountSet, operations: &[OperationRequest]) -> Result<BatchPlan, BatchError> {
        if accounts.owner_id() != self.ctx.owner_id {
            return Err(BatchError::new(
                0,
                LedgerError::invariant(format!(
                    "accounts of owner {} supplied for owner {}",
                    accounts.owner_id(),
                    self.ctx.owner_id
                )),
            ));
        }

        let mut staged = accounts.clone();
        let mut entries = Vec::with_capacity(operations.len());

        for (index, op) in operations.iter().enumerate() {
            let produced = self
                .apply(&mut staged, op)
                .map_err(|error| BatchError::new(index, error))?;
            debug!(index, kind = %op.kind, produced = produced.len(), "operation staged");
            entries.extend(produced);
        }

        Ok(BatchPlan {
            entries,
            accounts: staged,
        })
    }

    fn apply(&self, staged: &mut AccountSet, op: &OperationRequest) -> Result<Vec<LedgerEntry>, LedgerError> {
        let amount = op.validated_amount()?;
        let kind = op.parsed_kind()?;
        let at = op.occurred_at.unwrap_or(self.ctx.now);

        let entries = match kind {
            EntryKind::Income => self.income(staged, op, amount, at)?,
            EntryKind::Expense => self.expense(staged, op, amount, at)?,
            EntryKind::Transfer => self.transfer(staged, op, amount, at)?,
        };

        for id in entries.iter().flat_map(LedgerEntry::account_ids) {
            if let Some(account) = staged.get(id) {
                account.validate()?;
            }
        }
        Ok(entries)
    }

    fn income(
        &self,
        staged: &mut AccountSet,
        op: &OperationRequest,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let dest = resolve_owned(staged, op.destination_account_id)?;
        ensure_active(&dest)?;

        let mut description = "Income";
        match self.ctx.pool {
            Some(pool) => {
                self.ensure_pool_accounts(staged, pool)?;
                let pool_role = pool.role_of(dest.id).ok_or(LedgerError::IncomeOutsidePool(dest.id))?;
                if pool_role == PoolRole::Secondary {
                    ensure_capacity(&dest, pool, amount)?;
                    description = "Pool top-up: Income";
                }
            }
            None if !dest.is_debit() => return Err(LedgerError::IncomeRequiresDebitAccount(dest.id)),
            None => {}
        }

        credit(staged, dest.id, amount)?;
        Ok(vec![self.entry(
            EntryKind::Income,
            amount,
            None,
            Some(dest.id),
            op,
            CATEGORY_OTHER,
            description,
            at,
        )])
    }

    fn expense(
        &self,
        staged: &mut AccountSet,
        op: &OperationRequest,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let source = resolve_owned(staged, op.source_account_id)?;
        ensure_active(&source)?;

        if let Some(pool) = self.ctx.pool {
            if pool.role_of(source.id) == Some(PoolRole::Primary) {
                self.ensure_pool_accounts(staged, pool)?;
                return self.pooled_withdrawal(staged, pool, &source, op, amount, at);
            }
        }

        ensure_can_debit(&source, amount)?;
        debit(staged, source.id, amount)?;
        Ok(vec![self.entry(
            EntryKind::Expense,
            amount,
            Some(source.id),
            None,
            op,
            CATEGORY_OTHER,
            "Expense",
            at,
        )])
    }

    /// Expense against Primary draws from the combined pool: Primary first,
    /// the remainder from Secondary, one entry per non-zero leg.
    fn pooled_withdrawal(
        &self,
        staged: &mut AccountSet,
        pool: &PoolConfig,
        primary: &Account,
        op: &OperationRequest,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let secondary = resolve_owned(staged, Some(pool.secondary_account_id))?;

        let primary_funds = primary.available_funds().unwrap_or(Money::ZERO);
        let secondary_funds = if secondary.is_active() {
            secondary.available_funds().unwrap_or(Money::ZERO)
        } else {
            Money::ZERO
        };
        let available = primary_funds.checked_add(secondary_funds)?;
        if available < amount {
            return Err(LedgerError::InsufficientPoolFunds {
                available,
                requested: amount,
            });
        }

        let from_primary = amount.min(primary_funds);
        let from_secondary = amount.checked_sub(from_primary)?;

        let mut entries = Vec::with_capacity(2);
        for (account, leg) in [(primary, from_primary), (&secondary, from_secondary)] {
            if !leg.is_positive() {
                continue;
            }
            ensure_active(account)?;
            debit(staged, account.id, leg)?;
            let description = format!("Expense from {}", account.name);
            entries.push(self.entry(
                EntryKind::Expense,
                leg,
                Some(account.id),
                None,
                op,
                CATEGORY_OTHER,
                &description,
                at,
            ));
        }

        debug!(
            primary = %from_primary,
            secondary = %from_secondary,
            "pooled withdrawal split"
        );
        Ok(entries)
    }

    fn transfer(
        &self,
        staged: &mut AccountSet,
        op: &OperationRequest,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let source = resolve_owned(staged, op.source_account_id)?;
        let dest_id = op.destination_account_id.ok_or(LedgerError::AccountNotFound(None))?;
        let dest = match staged.lookup(dest_id) {
            AccountLookup::Owned(account) => account.clone(),
            AccountLookup::Foreign => return Err(LedgerError::CrossOwnerTransfer(dest_id)),
            AccountLookup::Missing => return Err(LedgerError::AccountNotFound(Some(dest_id))),
        };
        ensure_active(&source)?;
        ensure_active(&dest)?;

        if source.id == dest.id {
            return Err(LedgerError::SameAccountTransfer(source.id));
        }

        ensure_can_debit(&source, amount)?;
        match dest.available_credit() {
            None => {
                if let Some(pool) = self.ctx.pool {
                    if pool.role_of(dest.id) == Some(PoolRole::Secondary) {
                        ensure_capacity(&dest, pool, amount)?;
                    }
                }
            }
            Some(_) => {
                let debt = dest.tracked_value();
                if amount > debt {
                    return Err(LedgerError::CreditOverpayment {
                        account_id: dest.id,
                        debt,
                        requested: amount,
                    });
                }
            }
        }

        debit(staged, source.id, amount)?;
        credit(staged, dest.id, amount)?;

        let description = format!("Transfer to {}", dest.name);
        Ok(vec![self.entry(
            EntryKind::Transfer,
            amount,
            Some(source.id),
            Some(dest.id),
            op,
            CATEGORY_TRANSFER,
            &description,
            at,
        )])
    }

    fn ensure_pool_accounts(&self, staged: &AccountSet, pool: &PoolConfig) -> Result<(), LedgerError> {
        let present = |id: AccountId| staged.get(id).is_some_and(Account::is_debit);
        if present(pool.primary_account_id) && present(pool.secondary_account_id) {
            Ok(())
        } else {
            Err(LedgerError::PoolNotConfigured(self.ctx.role.to_string()))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        kind: EntryKind,
        amount: Money,
        source_account_id: Option<AccountId>,
        destination_account_id: Option<AccountId>,
        op: &OperationRequest,
        default_category: &str,
        default_description: &str,
        occurred_at: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(),
            owner_id: self.ctx.owner_id,
            kind,
            amount,
            source_account_id,
            destination_account_id,
            status: EntryStatus::Completed,
            occurred_at,
            category: non_blank(&op.category).unwrap_or(default_category).to_string(),
            description: non_blank(&op.description).unwrap_or(default_description).to_string(),
        }
    }
}

fn resolve_owned(staged: &AccountSet, id: Option<AccountId>) -> Result<Account, LedgerError> {
    let id = id.ok_or(LedgerError::AccountNotFound(None))?;
    match staged.lookup(id) {
        AccountLookup::Owned(account) => Ok(account.clone()),
        AccountLookup::Foreign | AccountLookup::Missing => Err(LedgerError::AccountNotFound(Some(id))),
    }
}

fn ensure_active(account: &Account) -> Result<(), LedgerError> {
    if account.is_active() {
        Ok(())
    } else {
        Err(LedgerError::AccountInactive(account.id))
    }
}

fn ensure_can_debit(account: &Account, amount: Money) -> Result<(), LedgerError> {
    if let Some(available) = account.available_funds() {
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account_id: account.id,
                available,
                requested: amount,
            });
        }
    }
    if let Some(available) = account.available_credit() {
        if available < amount {
            return Err(LedgerError::InsufficientCredit {
                account_id: account.id,
                available,
                requested: amount,
            });
        }
    }
    Ok(())
}

fn ensure_capacity(secondary: &Account, pool: &PoolConfig, amount: Money) -> Result<(), LedgerError> {
    let balance = secondary.available_funds().unwrap_or(Money::ZERO);
    if balance.checked_add(amount)? > pool.secondary_cap {
        return Err(LedgerError::PoolCapacityExceeded {
            account_id: secondary.id,
            headroom: pool.secondary_cap.checked_sub(balance)?.floor_zero(),
            requested: amount,
        });
    }
    Ok(())
}

fn debit(staged: &mut AccountSet, id: AccountId, amount: Money) -> Result<(), LedgerError> {
    staged
        .get_mut(id)
        .ok_or(LedgerError::AccountNotFound(Some(id)))?
        .debit(amount)?;
    Ok(())
}

fn credit(staged: &mut AccountSet, id: AccountId, amount: Money) -> Result<(), LedgerError> {
    staged
        .get_mut(id)
        .ok_or(LedgerError::AccountNotFound(Some(id)))?
        .credit(amount)?;
    Ok(())
}
