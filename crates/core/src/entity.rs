//! Entity trait: identity plus the owner that scopes it.

use crate::id::OwnerId;

/// Owner-scoped domain entity.
///
/// Every account and ledger entry belongs to exactly one owner, and no
/// operation may read or write across owners. Stores use `belongs_to` to
/// enforce that on every write.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    fn owner_id(&self) -> OwnerId;

    fn belongs_to(&self, owner_id: OwnerId) -> bool {
        self.owner_id() == owner_id
    }
}
