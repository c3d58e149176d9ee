use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fintrack_core::OwnerId;

use crate::event::Event;

/// Envelope for a published event, carrying owner + routing metadata.
///
/// Observers are keyed by owner: the notification layer delivers an envelope
/// only to sessions of `owner_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    owner_id: OwnerId,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        owner_id: OwnerId,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            owner_id,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, copying its owner, type name and business time.
    pub fn wrap(event: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            event.owner_id(),
            event.event_type(),
            event.occurred_at(),
            event,
        )
    }
}
