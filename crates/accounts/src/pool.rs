//! Pooled accounts of a privileged role.
//!
//! A privileged role allocates against two designated debit accounts as one
//! logical target: an uncapped **Primary** and a **Secondary** with a hard
//! capacity ceiling. Which accounts those are is configuration, resolved per
//! request, never inferred from account names.

use serde::{Deserialize, Serialize};

use fintrack_core::{AccountId, Money, Role};

/// Default Secondary ceiling: 50 000.00.
pub const DEFAULT_SECONDARY_CAP_CENTS: i64 = 5_000_000;

fn default_secondary_cap() -> Money {
    Money::from_cents(DEFAULT_SECONDARY_CAP_CENTS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolRole {
    Primary,
    Secondary,
}

/// Pool assignment for one privileged role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub role: Role,
    pub primary_account_id: AccountId,
    pub secondary_account_id: AccountId,
    #[serde(default = "default_secondary_cap")]
    pub secondary_cap: Money,
}

impl PoolConfig {
    pub fn new(role: Role, primary_account_id: AccountId, secondary_account_id: AccountId) -> Self {
        Self {
            role,
            primary_account_id,
            secondary_account_id,
            secondary_cap: default_secondary_cap(),
        }
    }

    pub fn with_secondary_cap(mut self, cap: Money) -> Self {
        self.secondary_cap = cap;
        self
    }

    pub fn role_of(&self, account_id: AccountId) -> Option<PoolRole> {
        if account_id == self.primary_account_id {
            Some(PoolRole::Primary)
        } else if account_id == self.secondary_account_id {
            Some(PoolRole::Secondary)
        } else {
            None
        }
    }

    pub fn is_pooled(&self, account_id: AccountId) -> bool {
        self.role_of(account_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_defaults_when_omitted() {
        let primary = AccountId::new();
        let secondary = AccountId::new();
        let json = format!(
            r#"{{"role":"admin","primary_account_id":"{primary}","secondary_account_id":"{secondary}"}}"#
        );
        let cfg: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.secondary_cap, Money::from_cents(5_000_000));
        assert_eq!(cfg.role_of(primary), Some(PoolRole::Primary));
        assert_eq!(cfg.role_of(secondary), Some(PoolRole::Secondary));
        assert!(!cfg.is_pooled(AccountId::new()));
    }
}
