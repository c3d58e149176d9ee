use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fintrack_core::{AccountId, Money};

use crate::entry::EntryKind;
use crate::error::LedgerError;

/// One logical operation as submitted by the request layer.
///
/// Fields are kept loose (string kind, raw decimal) so that validation, and
/// its typed errors, happen inside the engine in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub source_account_id: Option<AccountId>,
    #[serde(default)]
    pub destination_account_id: Option<AccountId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl OperationRequest {
    pub fn income(destination: AccountId, amount: Money) -> Self {
        Self::bare(EntryKind::Income, amount, None, Some(destination))
    }

    pub fn expense(source: AccountId, amount: Money) -> Self {
        Self::bare(EntryKind::Expense, amount, Some(source), None)
    }

    pub fn transfer(source: AccountId, destination: AccountId, amount: Money) -> Self {
        Self::bare(EntryKind::Transfer, amount, Some(source), Some(destination))
    }

    fn bare(
        kind: EntryKind,
        amount: Money,
        source_account_id: Option<AccountId>,
        destination_account_id: Option<AccountId>,
    ) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            amount: amount.amount(),
            source_account_id,
            destination_account_id,
            description: None,
            category: None,
            occurred_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Rule 1: a positive amount with at most two fractional digits.
    pub fn validated_amount(&self) -> Result<Money, LedgerError> {
        let amount = Money::new(self.amount).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("amount must be positive, got {amount}")));
        }
        Ok(amount)
    }

    pub fn parsed_kind(&self) -> Result<EntryKind, LedgerError> {
        self.kind.parse()
    }
}
