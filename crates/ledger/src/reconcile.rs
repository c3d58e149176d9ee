//! Reconciliation: rebuild an account's balance or debt from its history.
//!
//! Deleting an entry is never undone by an inverse mutation. Instead every
//! account the entry referenced is recomputed from the completed entries
//! that remain, which also heals any earlier drift.

use serde::{Deserialize, Serialize};
use tracing::warn;

use fintrack_accounts::{Account, AccountKind, AccountSet, PoolConfig, PoolRole};
use fintrack_core::{AccountId, Money};

use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Result of recomputing one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recomputed {
    pub account_id: AccountId,
    pub previous: Money,
    pub value: Money,
    /// Completed entries that referenced the account.
    pub entries_counted: usize,
    /// No entries remained; the kind-specific default was used.
    pub defaulted: bool,
    /// The history summed below zero and was floored.
    pub clamped: bool,
}

/// Contribution of `entry` to the tracked value of `account`.
///
/// For a debit account that is the balance change (in minus out); for a
/// credit account the debt change (out minus in). `None` when the entry is
/// not completed or does not touch the account.
pub fn signed_effect(entry: &LedgerEntry, account: &Account) -> Option<Money> {
    if !entry.is_completed() {
        return None;
    }
    let inflow = entry.destination_account_id == Some(account.id);
    let outflow = entry.source_account_id == Some(account.id);
    let net = match (inflow, outflow) {
        (true, false) => entry.amount,
        (false, true) => entry.amount.negate(),
        _ => return None,
    };
    Some(match account.kind {
        AccountKind::Debit { .. } => net,
        AccountKind::Credit { .. } => net.negate(),
    })
}

/// Value an account falls back to once no entry references it.
///
/// Plain debit and credit accounts go to zero. A Secondary pooled account is
/// topped up to its ceiling; Primary goes to zero.
pub fn default_value(account: &Account, pool: Option<&PoolConfig>) -> Money {
    match (&account.kind, pool.and_then(|p| p.role_of(account.id))) {
        (AccountKind::Debit { .. }, Some(PoolRole::Secondary)) => pool.map_or(Money::ZERO, |p| p.secondary_cap),
        _ => Money::ZERO,
    }
}

/// Recompute `account` from `history` (entries of any account; irrelevant
/// ones are skipped).
///
/// A debit balance summing below zero is floored. A credit debt above the
/// limit is refused with `DebtExceedsLimit`, so nothing gets saved.
pub fn recompute_account(
    account: &Account,
    history: &[LedgerEntry],
    pool: Option<&PoolConfig>,
) -> Result<Recomputed, LedgerError> {
    let mut total = Money::ZERO;
    let mut counted = 0usize;
    for entry in history {
        if let Some(delta) = signed_effect(entry, account) {
            total = total.checked_add(delta)?;
            counted += 1;
        }
    }

    let previous = account.tracked_value();
    if counted == 0 {
        return Ok(Recomputed {
            account_id: account.id,
            previous,
            value: default_value(account, pool),
            entries_counted: 0,
            defaulted: true,
            clamped: false,
        });
    }

    let clamped = total.is_negative();
    if clamped {
        warn!(
            account_id = %account.id,
            computed = %total,
            "recomputed value below zero; clamping to 0"
        );
    }
    let value = total.floor_zero();

    if let AccountKind::Credit { credit_limit, .. } = account.kind {
        if value > credit_limit {
            return Err(LedgerError::DebtExceedsLimit {
                account_id: account.id,
                debt: value,
                limit: credit_limit,
            });
        }
    }

    Ok(Recomputed {
        account_id: account.id,
        previous,
        value,
        entries_counted: counted,
        defaulted: false,
        clamped,
    })
}

/// Recompute every account `deleted` referenced, writing the new values into
/// `accounts`. `remaining` is the owner's history after the deletion.
///
/// Referenced accounts missing from `accounts` are skipped with a warning.
pub fn reconcile_deletion(
    accounts: &mut AccountSet,
    deleted: &LedgerEntry,
    remaining: &[LedgerEntry],
    pool: Option<&PoolConfig>,
) -> Result<Vec<Recomputed>, LedgerError> {
    let history: Vec<LedgerEntry> = remaining.iter().filter(|e| e.id != deleted.id).cloned().collect();

    let mut results = Vec::new();
    for id in deleted.account_ids() {
        let Some(account) = accounts.get_mut(id) else {
            warn!(account_id = %id, entry_id = %deleted.id, "referenced account not found during reconciliation");
            continue;
        };
        let recomputed = recompute_account(account, &history, pool)?;
        account.set_tracked_value(recomputed.value);
        results.push(recomputed);
    }
    Ok(results)
}
