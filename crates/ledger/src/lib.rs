//! Ledger engine: income / expense / transfer batches and reconciliation.
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns. The
//! engine plans a batch against a staged copy of one owner's accounts; the
//! infrastructure layer loads and locks those accounts, persists the plan and
//! publishes [`LedgerEvent`]s after commit.

pub mod engine;
pub mod entry;
pub mod error;
pub mod event;
pub mod operation;
pub mod query;
pub mod reconcile;

pub use engine::{BatchContext, BatchPlan, LedgerEngine};
pub use entry::{EntryKind, EntryMetadataPatch, EntryStatus, LedgerEntry};
pub use error::{BatchError, LedgerError};
pub use event::LedgerEvent;
pub use operation::OperationRequest;
pub use query::{DEFAULT_PAGE_LIMIT, EntryFilter, MAX_PAGE_LIMIT, Page};
pub use reconcile::{Recomputed, default_value, recompute_account, reconcile_deletion, signed_effect};
