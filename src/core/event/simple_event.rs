// SPDX-License-Identifier: MIT OR Apache-2.0

use super::timestamp::Timestamp;
use std::hash::{Hash, Hasher};

/// A primitive event produced by a sensor or parsed from the wire.
///
/// Identity is the externally assigned `id`: two simple events with the same id
/// are equal regardless of their other fields.
#[derive(Debug, Clone)]
pub struct SimpleEvent {
    id: String,
    timestamp: Timestamp,
    event_type: String,
    attributes: Vec<String>,
}

impl SimpleEvent {
    pub fn new(
        id: impl Into<String>,
        timestamp: Timestamp,
        event_type: impl Into<String>,
        attributes: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            event_type: event_type.into(),
            attributes,
        }
    }

    /// Copy of this event carrying a new id (output selection).
    pub fn relabeled(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Attribute values, positionally meaningful to predicate logic
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Id of this event if it has the given type
    pub fn event_id_of(&self, event_type: &str) -> Option<&str> {
        (self.event_type == event_type).then_some(self.id.as_str())
    }

    /// Timestamp of this event if it has the given type
    pub fn timestamp_of(&self, event_type: &str) -> Option<Timestamp> {
        (self.event_type == event_type).then_some(self.timestamp)
    }
}

impl PartialEq for SimpleEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SimpleEvent {}

impl Hash for SimpleEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
