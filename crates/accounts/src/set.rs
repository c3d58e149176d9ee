use std::collections::{BTreeMap, BTreeSet};

use fintrack_core::{AccountId, DomainError, DomainResult, Entity, Money, OwnerId};

use crate::account::{Account, BalanceField};

/// Where a referenced account id resolves to, from one owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLookup<'a> {
    Owned(&'a Account),
    /// Exists, but belongs to another owner.
    Foreign,
    Missing,
}

/// One owner's accounts, as loaded inside an atomic scope.
///
/// `foreign` records ids that were referenced by a request and exist but
/// belong to someone else, so rules can tell "not yours" from "no such
/// account" without ever exposing the other owner's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSet {
    owner_id: OwnerId,
    accounts: BTreeMap<AccountId, Account>,
    foreign: BTreeSet<AccountId>,
}

impl AccountSet {
    pub fn new(owner_id: OwnerId, accounts: impl IntoIterator<Item = Account>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for account in accounts {
            if !account.belongs_to(owner_id) {
                return Err(DomainError::invariant(format!(
                    "account {} does not belong to owner {owner_id}",
                    account.id
                )));
            }
            map.insert(account.id, account);
        }
        Ok(Self {
            owner_id,
            accounts: map,
            foreign: BTreeSet::new(),
        })
    }

    pub fn with_foreign(mut self, ids: impl IntoIterator<Item = AccountId>) -> Self {
        self.foreign.extend(ids.into_iter().filter(|id| !self.accounts.contains_key(id)));
        self
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn get_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.get_mut(&id)
    }

    pub fn lookup(&self, id: AccountId) -> AccountLookup<'_> {
        match self.accounts.get(&id) {
            Some(account) => AccountLookup::Owned(account),
            None if self.foreign.contains(&id) => AccountLookup::Foreign,
            None => AccountLookup::Missing,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn debit_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|a| a.is_debit())
    }

    pub fn credit_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|a| a.is_credit())
    }

    /// Mutate a single field of one owned account.
    pub fn apply_delta(&mut self, id: AccountId, field: BalanceField, delta: Money) -> DomainResult<()> {
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| DomainError::validation(format!("account {id} is not in this scope")))?;
        account.apply_delta(field, delta)
    }

    pub fn available_funds(&self, id: AccountId) -> Option<Money> {
        self.get(id).and_then(Account::available_funds)
    }

    pub fn available_credit(&self, id: AccountId) -> Option<Money> {
        self.get(id).and_then(Account::available_credit)
    }

    /// Accounts whose state differs from `baseline` (same owner scope).
    pub fn changed_since<'a>(&'a self, baseline: &'a AccountSet) -> impl Iterator<Item = &'a Account> {
        self.accounts
            .values()
            .filter(move |a| baseline.get(a.id) != Some(a))
    }

    pub fn into_accounts(self) -> Vec<Account> {
        self.accounts.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_set() -> (AccountSet, AccountId, AccountId) {
        let owner = OwnerId::new();
        let cash = Account::new_debit(AccountId::new(), owner, "Cash", Money::from_cents(1_000));
        let card = Account::new_credit(
            AccountId::new(),
            owner,
            "Card",
            Money::from_cents(5_000),
            Money::from_cents(1_000),
        );
        let (cash_id, card_id) = (cash.id, card.id);
        (AccountSet::new(owner, [cash, card]).unwrap(), cash_id, card_id)
    }

    #[test]
    fn rejects_accounts_of_another_owner() {
        let stranger = Account::new_debit(AccountId::new(), OwnerId::new(), "X", Money::ZERO);
        assert!(AccountSet::new(OwnerId::new(), [stranger]).is_err());
    }

    #[test]
    fn lookup_distinguishes_foreign_from_missing() {
        let (set, cash, _) = owner_set();
        let foreign = AccountId::new();
        let set = set.with_foreign([foreign, cash]);

        assert!(matches!(set.lookup(cash), AccountLookup::Owned(_)));
        assert_eq!(set.lookup(foreign), AccountLookup::Foreign);
        assert_eq!(set.lookup(AccountId::new()), AccountLookup::Missing);
    }

    #[test]
    fn splits_by_kind_and_reports_availability() {
        let (set, cash, card) = owner_set();
        assert_eq!(set.debit_accounts().count(), 1);
        assert_eq!(set.credit_accounts().count(), 1);
        assert_eq!(set.available_funds(cash), Some(Money::from_cents(1_000)));
        assert_eq!(set.available_credit(card), Some(Money::from_cents(4_000)));
        assert_eq!(set.available_credit(cash), None);
    }

    #[test]
    fn changed_since_reports_only_mutated_accounts() {
        let (baseline, cash, _) = owner_set();
        let mut staged = baseline.clone();
        staged
            .apply_delta(cash, BalanceField::Balance, Money::from_cents(-250))
            .unwrap();

        let changed: Vec<_> = staged.changed_since(&baseline).map(|a| a.id).collect();
        assert_eq!(changed, vec![cash]);
    }
}
