// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event model shared by the transports and the pattern engine.

pub mod codec;
pub mod complex_event;
pub mod simple_event;
pub mod timestamp;

pub use complex_event::ComplexEvent;
pub use simple_event::SimpleEvent;
pub use timestamp::{format_timestamp, parse_timestamp, Timestamp};

use crate::core::error::{NodeError, NodeResult};
use std::collections::HashSet;

/// A simple or complex event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    Simple(SimpleEvent),
    Complex(ComplexEvent),
}

impl Event {
    pub fn is_simple(&self) -> bool {
        matches!(self, Event::Simple(_))
    }

    pub fn event_type(&self) -> &str {
        match self {
            Event::Simple(e) => e.event_type(),
            Event::Complex(e) => e.event_type(),
        }
    }

    /// Timestamp used for watermarking.
    ///
    /// For complex events this is the creation timestamp.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::Simple(e) => e.timestamp(),
            Event::Complex(e) => e.creation_timestamp(),
        }
    }

    /// Identity: the id of a simple event, the composite id of a complex one
    pub fn id(&self) -> &str {
        match self {
            Event::Simple(e) => e.id(),
            Event::Complex(e) => e.composite_id(),
        }
    }

    pub fn highest_timestamp(&self) -> Option<Timestamp> {
        match self {
            Event::Simple(e) => Some(e.timestamp()),
            Event::Complex(e) => e.highest_timestamp(),
        }
    }

    pub fn lowest_timestamp(&self) -> Option<Timestamp> {
        match self {
            Event::Simple(e) => Some(e.timestamp()),
            Event::Complex(e) => e.lowest_timestamp(),
        }
    }

    pub fn event_id_of(&self, event_type: &str) -> Option<&str> {
        match self {
            Event::Simple(e) => e.event_id_of(event_type),
            Event::Complex(e) => e.event_id_of(event_type),
        }
    }

    pub fn timestamp_of(&self, event_type: &str) -> Option<Timestamp> {
        match self {
            Event::Simple(e) => e.timestamp_of(event_type),
            Event::Complex(e) => e.timestamp_of(event_type),
        }
    }

    pub fn event_of_type(&self, event_type: &str) -> Option<&SimpleEvent> {
        match self {
            Event::Simple(e) => (e.event_type() == event_type).then_some(e),
            Event::Complex(e) => e.event_of_type(event_type),
        }
    }

    /// The primitive events this event is made of
    pub fn contained_simple_events(&self) -> &[SimpleEvent] {
        match self {
            Event::Simple(e) => std::slice::from_ref(e),
            Event::Complex(e) => e.constituents(),
        }
    }
}

impl From<SimpleEvent> for Event {
    fn from(event: SimpleEvent) -> Self {
        Event::Simple(event)
    }
}

impl From<ComplexEvent> for Event {
    fn from(event: ComplexEvent) -> Self {
        Event::Complex(event)
    }
}

const OPERATORS: [&str; 2] = ["AND", "SEQ"];

/// Primitive event types named in an operator term such as `AND(A,SEQ(B,C))`.
pub fn primitive_types(term: &str) -> NodeResult<HashSet<String>> {
    let mut acc = HashSet::new();
    collect_primitive_types(term, &mut acc)?;
    Ok(acc)
}

fn collect_primitive_types(term: &str, acc: &mut HashSet<String>) -> NodeResult<()> {
    let term = term.trim();
    if term.chars().count() == 1 {
        acc.insert(term.to_string());
        return Ok(());
    }

    let invalid = || NodeError::configuration(format!("Invalid complex event expression: {}", term));

    for operator in OPERATORS {
        let Some(inner) = term
            .strip_prefix(operator)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
        else {
            continue;
        };

        let mut args = Vec::new();
        let mut depth = 0i32;
        let mut buf = String::new();
        for c in inner.chars() {
            match c {
                ',' if depth == 0 => {
                    args.push(std::mem::take(&mut buf));
                    continue;
                }
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(invalid());
            }
            buf.push(c);
        }
        if depth > 0 {
            return Err(invalid());
        }
        args.push(buf);

        for arg in &args {
            collect_primitive_types(arg, acc)?;
        }
        return Ok(());
    }
    Err(invalid())
}
