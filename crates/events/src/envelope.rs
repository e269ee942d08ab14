use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for an event, carrying dispatch metadata.
///
/// This is the unit the dispatcher queues and hands to handlers.
///
/// Notes:
/// - `sequence_number` is assigned at enqueue time and is strictly increasing per
///   dispatcher, so delivery order equals sequence order.
/// - `payload` is the domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    /// Position in the dispatcher's publish order (starts at 1).
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: Uuid, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
