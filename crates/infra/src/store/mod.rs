//! Ledger persistence boundary.
//!
//! Defines the atomic-scope abstraction the service runs batches in, plus an
//! in-memory backend (tests/dev) and a Postgres backend.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, LedgerTx, StoreError};
