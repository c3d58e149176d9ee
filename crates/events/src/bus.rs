//! Notification hand-off between the ledger core and whatever fans changes
//! out to connected observers (in-memory channels, a websocket hub, a broker).
//!
//! Delivery is at-least-once and nothing is persisted here: the ledger store
//! stays the source of truth, so an observer that missed a notification
//! recovers by re-reading entries.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end of a bus: one copy of every message published after it was
/// created.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// while let Ok(envelope) = subscription.recv_timeout(Duration::from_secs(1)) {
///     notify_sessions(envelope.owner_id(), envelope.payload());
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything already delivered, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Publish/subscribe transport for ledger notifications.
///
/// ```text
/// submit batch → atomic commit → EventBus::publish → observers
/// ```
///
/// The service only publishes after commit. A `publish` failure is reported
/// to the caller, but the change it describes stays committed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
