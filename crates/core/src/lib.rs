//! `fintrack-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the caller role, the 2-digit money value object and the shared
//! domain error.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod role;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, EntryId, OwnerId};
pub use money::Money;
pub use role::Role;
