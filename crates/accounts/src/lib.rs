//! Account store domain (debit and credit accounts, pooled-account tags).
//!
//! Pure data plus validity predicates: no IO, no locking. Mutations here are
//! only ever applied inside an atomic scope owned by the infrastructure layer.

pub mod account;
pub mod pool;
pub mod set;

pub use account::{Account, AccountKind, AccountStatus, BalanceField, Ledgered};
pub use pool::{DEFAULT_SECONDARY_CAP_CENTS, PoolConfig, PoolRole};
pub use set::{AccountLookup, AccountSet};
