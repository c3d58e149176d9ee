use chrono::{DateTime, Utc};

use fintrack_core::OwnerId;

/// A ledger change notification.
///
/// Every event belongs to one owner and describes a change that has already
/// committed; observers treat it as a fact, never as a request.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `ledger.entries_recorded`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Owner whose sessions should see the event.
    fn owner_id(&self) -> OwnerId;

    fn occurred_at(&self) -> DateTime<Utc>;
}
