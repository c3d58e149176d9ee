//! In-process bus for tests, dev and the replay tool.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("subscriber list lock poisoned")]
    Poisoned,
}

/// Broadcast over `std::sync::mpsc` channels; synchronous, no IO.
///
/// A message is in every live subscriber's queue by the time `publish`
/// returns. Subscribers whose receiver was dropped are forgotten on the next
/// publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        senders.retain(|sender| sender.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel();
        match self.senders.lock() {
            Ok(mut senders) => senders.push(sender),
            // Poisoned: the subscription is valid but will never receive.
            Err(_) => drop(sender),
        }
        Subscription::new(receiver)
    }
}
