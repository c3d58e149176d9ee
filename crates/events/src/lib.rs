//! Notification port: ledger change events and their pub/sub transport.
//!
//! The ledger core never talks to sockets or brokers. After a batch, deletion
//! or metadata edit commits, the service publishes an owner-scoped
//! [`EventEnvelope`] on an [`EventBus`]; whatever fans notifications out to
//! observers subscribes on the other side.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
