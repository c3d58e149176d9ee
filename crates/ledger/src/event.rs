use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fintrack_accounts::Account;
use fintrack_core::OwnerId;
use fintrack_events::Event;

use crate::entry::LedgerEntry;

/// Change notifications handed to the notification port after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    EntriesRecorded {
        owner_id: OwnerId,
        entries: Vec<LedgerEntry>,
        /// Accounts whose balance or debt changed.
        accounts: Vec<Account>,
        occurred_at: DateTime<Utc>,
    },
    EntryDeleted {
        owner_id: OwnerId,
        entry: LedgerEntry,
        /// Accounts after reconciliation.
        recomputed: Vec<Account>,
        occurred_at: DateTime<Utc>,
    },
    EntryAnnotated {
        owner_id: OwnerId,
        entry: LedgerEntry,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::EntriesRecorded { .. } => "ledger.entries_recorded",
            LedgerEvent::EntryDeleted { .. } => "ledger.entry_deleted",
            LedgerEvent::EntryAnnotated { .. } => "ledger.entry_annotated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn owner_id(&self) -> OwnerId {
        match self {
            LedgerEvent::EntriesRecorded { owner_id, .. }
            | LedgerEvent::EntryDeleted { owner_id, .. }
            | LedgerEvent::EntryAnnotated { owner_id, .. } => *owner_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::EntriesRecorded { occurred_at, .. }
            | LedgerEvent::EntryDeleted { occurred_at, .. }
            | LedgerEvent::EntryAnnotated { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fintrack_events::EventEnvelope;

    #[test]
    fn envelope_takes_owner_and_type_from_event() {
        let owner = OwnerId::new();
        let at = Utc::now();
        let event = LedgerEvent::EntriesRecorded {
            owner_id: owner,
            entries: Vec::new(),
            accounts: Vec::new(),
            occurred_at: at,
        };

        let envelope = EventEnvelope::wrap(event);
        assert_eq!(envelope.owner_id(), owner);
        assert_eq!(envelope.event_type(), "ledger.entries_recorded");
        assert_eq!(envelope.occurred_at(), at);
    }

    #[test]
    fn serializes_with_snake_case_tag() {
        let event = LedgerEvent::EntryAnnotated {
            owner_id: OwnerId::new(),
            entry: crate::entry::LedgerEntry {
                id: fintrack_core::EntryId::new(),
                owner_id: OwnerId::new(),
                kind: crate::entry::EntryKind::Income,
                amount: fintrack_core::Money::from_cents(100),
                source_account_id: None,
                destination_account_id: Some(fintrack_core::AccountId::new()),
                status: crate::entry::EntryStatus::Completed,
                occurred_at: Utc::now(),
                category: "Other".to_string(),
                description: "Income".to_string(),
            },
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "entry_annotated");
        assert_eq!(json["entry"]["amount"], "1.00");
    }
}
