//! Ledger rule violations.

use thiserror::Error;

use fintrack_core::{AccountId, DomainError, Money};

/// Why a single operation was rejected.
///
/// Every variant is recoverable at the batch boundary: the batch is discarded
/// and nothing is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// `None` when the operation did not name a required account at all.
    #[error("account not found: {}", display_account(.0))]
    AccountNotFound(Option<AccountId>),

    #[error("account {0} is not active")]
    AccountInactive(AccountId),

    #[error("insufficient funds on {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Money,
        requested: Money,
    },

    #[error("insufficient credit on {account_id}: available {available}, requested {requested}")]
    InsufficientCredit {
        account_id: AccountId,
        available: Money,
        requested: Money,
    },

    #[error("insufficient pooled funds: available {available}, requested {requested}")]
    InsufficientPoolFunds { available: Money, requested: Money },

    #[error("pool capacity exceeded on {account_id}: headroom {headroom}, requested {requested}")]
    PoolCapacityExceeded {
        account_id: AccountId,
        headroom: Money,
        requested: Money,
    },

    #[error("cannot transfer from {0} to itself")]
    SameAccountTransfer(AccountId),

    #[error("transfer destination {0} belongs to another owner")]
    CrossOwnerTransfer(AccountId),

    #[error("unknown operation kind '{0}'")]
    UnknownOperationKind(String),

    #[error("income must target a debit account, got {0}")]
    IncomeRequiresDebitAccount(AccountId),

    #[error("income for this role may only target its pooled accounts, got {0}")]
    IncomeOutsidePool(AccountId),

    #[error("pooled accounts for role '{0}' are missing or not debit accounts")]
    PoolNotConfigured(String),

    #[error("payment of {requested} exceeds debt {debt} on {account_id}")]
    CreditOverpayment {
        account_id: AccountId,
        debt: Money,
        requested: Money,
    },

    /// Rebuilding a card's debt from history would put it above its limit.
    #[error("recomputed debt {debt} on {account_id} exceeds credit limit {limit}")]
    DebtExceedsLimit {
        account_id: AccountId,
        debt: Money,
        limit: Money,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),
}

fn display_account(id: &Option<AccountId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "<not specified>".to_string(),
    }
}

impl LedgerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Stable machine-readable code for clients and logs.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::AccountInactive(_) => "account_inactive",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::InsufficientCredit { .. } => "insufficient_credit",
            LedgerError::InsufficientPoolFunds { .. } => "insufficient_pool_funds",
            LedgerError::PoolCapacityExceeded { .. } => "pool_capacity_exceeded",
            LedgerError::SameAccountTransfer(_) => "same_account_transfer",
            LedgerError::CrossOwnerTransfer(_) => "cross_owner_transfer",
            LedgerError::UnknownOperationKind(_) => "unknown_operation_kind",
            LedgerError::IncomeRequiresDebitAccount(_) => "income_requires_debit_account",
            LedgerError::IncomeOutsidePool(_) => "income_outside_pool",
            LedgerError::PoolNotConfigured(_) => "pool_not_configured",
            LedgerError::CreditOverpayment { .. } => "credit_overpayment",
            LedgerError::DebtExceedsLimit { .. } => "debt_exceeds_limit",
            LedgerError::Invariant(_) => "invariant_violation",
        }
    }

    /// Suggested HTTP status for the request layer.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::UnknownOperationKind(_)
            | LedgerError::SameAccountTransfer(_)
            | LedgerError::IncomeRequiresDebitAccount(_)
            | LedgerError::IncomeOutsidePool(_) => 400,
            LedgerError::CrossOwnerTransfer(_) => 403,
            LedgerError::AccountNotFound(_) => 404,
            LedgerError::AccountInactive(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::InsufficientCredit { .. }
            | LedgerError::InsufficientPoolFunds { .. }
            | LedgerError::PoolCapacityExceeded { .. }
            | LedgerError::CreditOverpayment { .. }
            | LedgerError::DebtExceedsLimit { .. } => 422,
            LedgerError::PoolNotConfigured(_) | LedgerError::Invariant(_) => 500,
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        LedgerError::Invariant(value.to_string())
    }
}

/// A rejected batch: the offending operation's index and why.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation #{index} rejected: {error}")]
pub struct BatchError {
    pub index: usize,
    #[source]
    pub error: LedgerError,
}

impl BatchError {
    pub fn new(index: usize, error: LedgerError) -> Self {
        Self { index, error }
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_names_index_and_cause() {
        let err = BatchError::new(2, LedgerError::AccountNotFound(None));
        assert_eq!(err.to_string(), "operation #2 rejected: account not found: <not specified>");
        assert_eq!(err.code(), "account_not_found");
        assert_eq!(err.error.http_status(), 404);
    }

    #[test]
    fn rule_violations_map_to_unprocessable() {
        let err = LedgerError::InsufficientPoolFunds {
            available: Money::from_cents(100),
            requested: Money::from_cents(200),
        };
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.code(), "insufficient_pool_funds");
    }
}
