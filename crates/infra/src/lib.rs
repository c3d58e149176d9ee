//! Infrastructure layer: ledger storage, configuration, service orchestration.

pub mod config;
pub mod service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{CONFIG_ENV_VAR, ConfigError, LedgerConfig};
pub use service::{LedgerService, ServiceError};
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError};
