//! JSON scenarios: accounts to open plus a list of steps to run in order.
//!
//! ```json
//! {
//!   "accounts": [{ "id": "…", "owner_id": "…", "name": "Cash", "status": "active",
//!                  "type": "debit", "balance": "0.00" }],
//!   "steps": [
//!     { "action": "submit", "owner_id": "…", "operations": [
//!         { "kind": "income", "amount": "100.00", "destination_account_id": "…" } ] },
//!     { "action": "delete", "owner_id": "…", "entry": { "recorded": 0 } }
//!   ]
//! }
//! ```
//!
//! A rejected step is reported and the replay moves on; only storage
//! failures abort it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use fintrack_accounts::Account;
use fintrack_core::{AccountId, EntryId, OwnerId, Role};
use fintrack_events::{EventBus, EventEnvelope};
use fintrack_infra::{LedgerConfig, LedgerService, LedgerStore, ServiceError};
use fintrack_ledger::{
    EntryFilter, EntryMetadataPatch, LedgerEntry, LedgerEvent, MAX_PAGE_LIMIT, OperationRequest, Recomputed,
};

fn default_role() -> Role {
    Role::new("user")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Overrides `FINTRACK_CONFIG` when no `--config` is given.
    #[serde(default)]
    pub config: Option<LedgerConfig>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Entry addressed by a step: the n-th entry recorded by this replay, or an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryRef {
    Recorded { recorded: usize },
    Id(EntryId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Submit {
        owner_id: OwnerId,
        #[serde(default = "default_role")]
        role: Role,
        operations: Vec<OperationRequest>,
    },
    Delete {
        owner_id: OwnerId,
        #[serde(default = "default_role")]
        role: Role,
        entry: EntryRef,
    },
    Annotate {
        owner_id: OwnerId,
        entry: EntryRef,
        patch: EntryMetadataPatch,
    },
    Recompute {
        owner_id: OwnerId,
        #[serde(default = "default_role")]
        role: Role,
        account_id: AccountId,
    },
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Step::Submit { .. } => "submit",
            Step::Delete { .. } => "delete",
            Step::Annotate { .. } => "annotate",
            Step::Recompute { .. } => "recompute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    pub code: &'static str,
    pub message: String,
    /// Offending operation of a rejected batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl From<&ServiceError> for StepError {
    fn from(err: &ServiceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            index: match err {
                ServiceError::Rejected(batch) => Some(batch.index),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<LedgerEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recomputed: Vec<Recomputed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerReport {
    pub owner_id: OwnerId,
    pub accounts: Vec<Account>,
    /// Newest first.
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub owners: Vec<OwnerReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventEnvelope<LedgerEvent>>,
}

impl Report {
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

struct Outcome {
    entries: Vec<LedgerEntry>,
    recomputed: Vec<Recomputed>,
}

/// Open the scenario's accounts, run its steps, and snapshot every owner.
pub fn replay<S, B>(service: &LedgerService<S, B>, scenario: &Scenario) -> Result<Report, ServiceError>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    let mut owners: BTreeSet<OwnerId> = BTreeSet::new();
    for account in &scenario.accounts {
        owners.insert(account.owner_id);
        service.open_account(account.clone())?;
    }

    let mut recorded: Vec<EntryId> = Vec::new();
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (step, item) in scenario.steps.iter().enumerate() {
        let result = run_step(service, item, &recorded);
        let outcome = match result {
            Ok(outcome) => {
                if matches!(item, Step::Submit { .. }) {
                    recorded.extend(outcome.entries.iter().map(|e| e.id));
                }
                StepOutcome {
                    step,
                    action: item.action(),
                    ok: true,
                    entries: outcome.entries,
                    recomputed: outcome.recomputed,
                    error: None,
                }
            }
            Err(err @ ServiceError::Store(_)) => return Err(err),
            Err(err) => {
                warn!(step, action = item.action(), code = err.code(), "step failed");
                StepOutcome {
                    step,
                    action: item.action(),
                    ok: false,
                    entries: Vec::new(),
                    recomputed: Vec::new(),
                    error: Some(StepError::from(&err)),
                }
            }
        };
        steps.push(outcome);
    }

    let owners = owners
        .into_iter()
        .map(|owner_id| owner_report(service, owner_id))
        .collect::<Result<Vec<_>, _>>()?;

    info!(steps = steps.len(), owners = owners.len(), "replay finished");
    Ok(Report {
        steps,
        owners,
        events: Vec::new(),
    })
}

fn run_step<S, B>(service: &LedgerService<S, B>, step: &Step, recorded: &[EntryId]) -> Result<Outcome, ServiceError>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    match step {
        Step::Submit {
            owner_id,
            role,
            operations,
        } => Ok(Outcome {
            entries: service.submit_batch(*owner_id, role, operations)?,
            recomputed: Vec::new(),
        }),
        Step::Delete { owner_id, role, entry } => {
            let id = resolve(entry, recorded);
            Ok(Outcome {
                entries: Vec::new(),
                recomputed: service.delete_entry(*owner_id, role, id)?,
            })
        }
        Step::Annotate { owner_id, entry, patch } => {
            let id = resolve(entry, recorded);
            Ok(Outcome {
                entries: vec![service.annotate_entry(*owner_id, id, patch)?],
                recomputed: Vec::new(),
            })
        }
        Step::Recompute {
            owner_id,
            role,
            account_id,
        } => Ok(Outcome {
            entries: Vec::new(),
            recomputed: vec![service.recompute_account(*owner_id, role, *account_id)?],
        }),
    }
}

/// Unknown `recorded` positions resolve to a fresh id, which is then not found.
fn resolve(entry: &EntryRef, recorded: &[EntryId]) -> EntryId {
    match entry {
        EntryRef::Id(id) => *id,
        EntryRef::Recorded { recorded: n } => recorded.get(*n).copied().unwrap_or_default(),
    }
}

fn owner_report<S, B>(service: &LedgerService<S, B>, owner_id: OwnerId) -> Result<OwnerReport, ServiceError>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    let accounts = service.accounts(owner_id)?.into_accounts();

    let mut entries = Vec::new();
    let mut filter = EntryFilter {
        limit: MAX_PAGE_LIMIT,
        ..EntryFilter::default()
    };
    loop {
        let page = service.list_entries(owner_id, &filter)?;
        let done = page.items.is_empty() || (entries.len() + page.items.len()) as u64 >= page.total;
        entries.extend(page.items);
        if done {
            break;
        }
        filter.page += 1;
    }

    Ok(OwnerReport {
        owner_id,
        accounts,
        entries,
    })
}
