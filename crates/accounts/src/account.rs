use serde::{Deserialize, Serialize};

use fintrack_core::{AccountId, DomainError, DomainResult, Entity, Money, OwnerId};

/// Lifecycle status; only `Active` accounts take part in new operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl core::str::FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(DomainError::validation(format!("unknown account status '{other}'"))),
        }
    }
}

/// Kind-specific state of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccountKind {
    /// Holds money; `balance` is never persisted negative.
    Debit { balance: Money },
    /// Borrows money; `0 <= debt <= credit_limit`.
    Credit { credit_limit: Money, debt: Money },
}

/// The single mutable field of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceField {
    Balance,
    Debt,
}

/// A debit or credit account owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub name: String,
    pub status: AccountStatus,
    #[serde(flatten)]
    pub kind: AccountKind,
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl Account {
    pub fn new_debit(id: AccountId, owner_id: OwnerId, name: impl Into<String>, balance: Money) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            status: AccountStatus::Active,
            kind: AccountKind::Debit { balance },
        }
    }

    pub fn new_credit(
        id: AccountId,
        owner_id: OwnerId,
        name: impl Into<String>,
        credit_limit: Money,
        debt: Money,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            status: AccountStatus::Active,
            kind: AccountKind::Credit { credit_limit, debt },
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_debit(&self) -> bool {
        matches!(self.kind, AccountKind::Debit { .. })
    }

    pub fn is_credit(&self) -> bool {
        matches!(self.kind, AccountKind::Credit { .. })
    }

    pub fn field(&self) -> BalanceField {
        match self.kind {
            AccountKind::Debit { .. } => BalanceField::Balance,
            AccountKind::Credit { .. } => BalanceField::Debt,
        }
    }

    /// The value of [`Account::field`]: balance for debit, debt for credit.
    pub fn tracked_value(&self) -> Money {
        match self.kind {
            AccountKind::Debit { balance } => balance,
            AccountKind::Credit { debt, .. } => debt,
        }
    }

    /// `balance` of a debit account.
    pub fn available_funds(&self) -> Option<Money> {
        match self.kind {
            AccountKind::Debit { balance } => Some(balance),
            AccountKind::Credit { .. } => None,
        }
    }

    /// `credit_limit - debt` of a credit account.
    pub fn available_credit(&self) -> Option<Money> {
        match self.kind {
            AccountKind::Debit { .. } => None,
            AccountKind::Credit { credit_limit, debt } => credit_limit.checked_sub(debt).ok(),
        }
    }

    /// Check the per-kind persistence invariants.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("account name must not be empty"));
        }
        match self.kind {
            AccountKind::Debit { balance } => {
                if balance.is_negative() {
                    return Err(DomainError::invariant(format!(
                        "debit account {} has negative balance {balance}",
                        self.id
                    )));
                }
            }
            AccountKind::Credit { credit_limit, debt } => {
                if credit_limit.is_negative() {
                    return Err(DomainError::invariant(format!(
                        "credit account {} has negative limit {credit_limit}",
                        self.id
                    )));
                }
                if debt.is_negative() || debt > credit_limit {
                    return Err(DomainError::invariant(format!(
                        "credit account {} debt {debt} outside [0, {credit_limit}]",
                        self.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Overwrite the tracked field (used by reconciliation).
    pub fn set_tracked_value(&mut self, value: Money) {
        match &mut self.kind {
            AccountKind::Debit { balance } => *balance = value,
            AccountKind::Credit { debt, .. } => *debt = value,
        }
    }

    /// Add a signed `delta` to `field`; the field must match the account kind.
    pub fn apply_delta(&mut self, field: BalanceField, delta: Money) -> DomainResult<()> {
        match (&mut self.kind, field) {
            (AccountKind::Debit { balance }, BalanceField::Balance) => {
                *balance = balance.checked_add(delta)?;
                Ok(())
            }
            (AccountKind::Credit { debt, .. }, BalanceField::Debt) => {
                *debt = debt.checked_add(delta)?;
                Ok(())
            }
            (_, field) => Err(DomainError::invariant(format!(
                "account {} has no {field:?} field",
                self.id
            ))),
        }
    }
}

/// Money movement with kind-specific semantics.
///
/// `debit` takes money out of the account (debit: balance down, credit: debt
/// up); `credit` puts money in (debit: balance up, credit: debt down). Rule
/// checks (sufficient funds, available credit) are the caller's job; these
/// only mutate.
pub trait Ledgered {
    fn debit(&mut self, amount: Money) -> DomainResult<()>;

    fn credit(&mut self, amount: Money) -> DomainResult<()>;
}

impl Ledgered for Account {
    fn debit(&mut self, amount: Money) -> DomainResult<()> {
        match self.kind {
            AccountKind::Debit { .. } => self.apply_delta(BalanceField::Balance, amount.negate()),
            AccountKind::Credit { .. } => self.apply_delta(BalanceField::Debt, amount),
        }
    }

    fn credit(&mut self, amount: Money) -> DomainResult<()> {
        match self.kind {
            AccountKind::Debit { .. } => self.apply_delta(BalanceField::Balance, amount),
            AccountKind::Credit { .. } => self.apply_delta(BalanceField::Debt, amount.negate()),
        }
    }
}
