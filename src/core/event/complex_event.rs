// SPDX-License-Identifier: MIT OR Apache-2.0

use super::simple_event::SimpleEvent;
use super::timestamp::Timestamp;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A match produced by the pattern engine.
///
/// The lookup tables and bounds are derived once in [`ComplexEvent::new`]. Predicate
/// evaluation reads them on every candidate, and since the constituent list cannot
/// change afterwards they never go stale.
#[derive(Debug, Clone)]
pub struct ComplexEvent {
    creation_timestamp: Timestamp,
    event_type: String,
    constituents: Vec<SimpleEvent>,

    type_to_timestamp: HashMap<String, Timestamp>,
    type_to_id: HashMap<String, String>,
    highest_timestamp: Option<Timestamp>,
    lowest_timestamp: Option<Timestamp>,
    composite_id: String,
}

impl ComplexEvent {
    pub fn new(
        creation_timestamp: Timestamp,
        event_type: impl Into<String>,
        constituents: Vec<SimpleEvent>,
    ) -> Self {
        let event_type = event_type.into();
        log::trace!(
            "Creating complex event {} with creation timestamp {}",
            event_type,
            creation_timestamp
        );

        let mut type_to_timestamp = HashMap::with_capacity(constituents.len());
        let mut type_to_id = HashMap::with_capacity(constituents.len());
        let mut composite_id = String::new();
        for e in &constituents {
            type_to_timestamp
                .entry(e.event_type().to_string())
                .or_insert(e.timestamp());
            type_to_id
                .entry(e.event_type().to_string())
                .or_insert_with(|| e.id().to_string());
            composite_id.push_str(e.id());
        }

        Self {
            creation_timestamp,
            highest_timestamp: constituents.iter().map(SimpleEvent::timestamp).max(),
            lowest_timestamp: constituents.iter().map(SimpleEvent::timestamp).min(),
            event_type,
            constituents,
            type_to_timestamp,
            type_to_id,
            composite_id,
        }
    }

    /// Time the match was created. Used for latency measurement only.
    pub fn creation_timestamp(&self) -> Timestamp {
        self.creation_timestamp
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn constituents(&self) -> &[SimpleEvent] {
        &self.constituents
    }

    pub fn len(&self) -> usize {
        self.constituents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constituents.is_empty()
    }

    /// Concatenated constituent ids, in constituent order
    pub fn composite_id(&self) -> &str {
        &self.composite_id
    }

    /// Timestamp of the first constituent with the given type
    pub fn timestamp_of(&self, event_type: &str) -> Option<Timestamp> {
        self.type_to_timestamp.get(event_type).copied()
    }

    /// Id of the first constituent with the given type
    pub fn event_id_of(&self, event_type: &str) -> Option<&str> {
        self.type_to_id.get(event_type).map(String::as_str)
    }

    /// First constituent with the given type
    pub fn event_of_type(&self, event_type: &str) -> Option<&SimpleEvent> {
        self.constituents
            .iter()
            .find(|e| e.event_type() == event_type)
    }

    pub fn highest_timestamp(&self) -> Option<Timestamp> {
        self.highest_timestamp
    }

    pub fn lowest_timestamp(&self) -> Option<Timestamp> {
        self.lowest_timestamp
    }

    /// Detection latency: creation time minus newest constituent, in milliseconds
    pub fn latency_ms(&self) -> Option<f64> {
        self.highest_timestamp
            .map(|newest| (self.creation_timestamp - newest) as f64 / 1000.0)
    }
}

impl PartialEq for ComplexEvent {
    fn eq(&self, other: &Self) -> bool {
        self.composite_id == other.composite_id && self.constituents == other.constituents
    }
}

impl Eq for ComplexEvent {}

impl Hash for ComplexEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.composite_id.hash(state);
    }
}
