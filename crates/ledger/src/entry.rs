use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fintrack_core::{AccountId, EntryId, Entity, Money, OwnerId};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
    Transfer,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
            EntryKind::Transfer => "transfer",
        }
    }
}

impl core::str::FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(EntryKind::Income),
            "expense" => Ok(EntryKind::Expense),
            "transfer" => Ok(EntryKind::Transfer),
            _ => Err(LedgerError::UnknownOperationKind(s.to_string())),
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl core::str::FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(LedgerError::invariant(format!("unknown entry status '{other}'"))),
        }
    }
}

/// One recorded money movement (immutable once completed).
///
/// `source_account_id` is the account debited (expense, transfer);
/// `destination_account_id` the account credited (income, transfer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub owner_id: OwnerId,
    pub kind: EntryKind,
    pub amount: Money,
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: Option<AccountId>,
    pub status: EntryStatus,
    pub occurred_at: DateTime<Utc>,
    pub category: String,
    pub description: String,
}

impl Entity for LedgerEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl LedgerEntry {
    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }

    pub fn references(&self, account_id: AccountId) -> bool {
        self.source_account_id == Some(account_id) || self.destination_account_id == Some(account_id)
    }

    /// Distinct accounts this entry touches (source first).
    pub fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.source_account_id.into_iter().collect();
        if let Some(dest) = self.destination_account_id {
            if !ids.contains(&dest) {
                ids.push(dest);
            }
        }
        ids
    }
}

/// Edit of an entry's free metadata; amount, kind and accounts are never editable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadataPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl EntryMetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.category.is_none() && self.occurred_at.is_none()
    }

    /// Apply non-blank fields; blank strings leave the old value in place.
    pub fn apply_to(&self, entry: &mut LedgerEntry) {
        if let Some(description) = non_blank(&self.description) {
            entry.description = description.to_string();
        }
        if let Some(category) = non_blank(&self.category) {
            entry.category = category.to_string();
        }
        if let Some(at) = self.occurred_at {
            entry.occurred_at = at;
        }
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
