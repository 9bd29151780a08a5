// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line protocol for events.
//!
//! ```text
//! simple | <id> | HH:mm:ss:SSSSSS | <type>[ | <attr>]*
//! complex | HH:mm:ss:SSSSSS | <type> | <count> | (ts, id, type[, attr]*)[ ;(ts, id, type[, attr]*)]*
//! ```

use super::timestamp::{format_timestamp, parse_timestamp};
use super::{ComplexEvent, Event, SimpleEvent};
use crate::core::error::{NodeError, NodeResult};
use std::fmt::Write;

pub const FIELD_SEPARATOR: char = '|';
pub const CONSTITUENT_SEPARATOR: char = ';';
pub const CONSTITUENT_FIELD_SEPARATOR: char = ',';

/// Marker a predecessor sends once its event stream is complete
pub const END_OF_STREAM: &str = "end-of-the-stream";

impl SimpleEvent {
    /// Serialize to the wire format (without line delimiter)
    pub fn encode(&self) -> NodeResult<String> {
        let mut out = format!(
            "simple | {} | {} | {}",
            self.id(),
            format_timestamp(self.timestamp())?,
            self.event_type()
        );
        for attribute in self.attributes() {
            out.push_str(" | ");
            out.push_str(attribute);
        }
        Ok(out)
    }
}

impl ComplexEvent {
    /// Serialize to the wire format (without line delimiter)
    pub fn encode(&self) -> NodeResult<String> {
        let mut out = format!(
            "complex | {} | {} | {} | ",
            format_timestamp(self.creation_timestamp())?,
            self.event_type(),
            self.len()
        );
        for (i, e) in self.constituents().iter().enumerate() {
            if i > 0 {
                out.push_str(" ;");
            }
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                "({}, {}, {}",
                format_timestamp(e.timestamp())?,
                e.id(),
                e.event_type()
            );
            for attribute in e.attributes() {
                out.push_str(", ");
                out.push_str(attribute);
            }
            out.push(')');
        }
        Ok(out)
    }
}

impl Event {
    /// Serialize to the wire format (without line delimiter)
    pub fn encode(&self) -> NodeResult<String> {
        match self {
            Event::Simple(e) => e.encode(),
            Event::Complex(e) => e.encode(),
        }
    }

    /// Parse one wire line into an event.
    ///
    /// The `count` field of a complex event must be an integer but is not checked
    /// against the number of constituents actually present.
    pub fn parse(line: &str) -> NodeResult<Event> {
        log::trace!("Event::parse received: {}", line);
        let parts = split_fields(line, FIELD_SEPARATOR);
        let field = |index: usize| -> NodeResult<&str> {
            parts
                .get(index)
                .map(|s| s.trim())
                .ok_or_else(|| NodeError::malformed(line, format!("missing field {}", index)))
        };

        match field(0)? {
            "simple" => {
                let id = field(1)?;
                let timestamp = parse_timestamp(field(2)?).map_err(|e| rewrap(line, e))?;
                let event_type = field(3)?;
                let attributes = parts
                    .iter()
                    .skip(4)
                    .map(|a| a.trim())
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(Event::Simple(SimpleEvent::new(id, timestamp, event_type, attributes)))
            }
            "complex" => {
                let creation = parse_timestamp(field(1)?).map_err(|e| rewrap(line, e))?;
                let event_type = field(2)?;
                let _count: i32 = field(3)?.parse().map_err(|e| {
                    NodeError::malformed(line, format!("invalid constituent count: {}", e))
                })?;
                let constituents = parse_constituents(line, field(4)?)?;
                Ok(Event::Complex(ComplexEvent::new(creation, event_type, constituents)))
            }
            other => Err(NodeError::malformed(
                line,
                format!("received message has wrong type: {}", other),
            )),
        }
    }
}

fn parse_constituents(line: &str, list: &str) -> NodeResult<Vec<SimpleEvent>> {
    if list.is_empty() {
        return Ok(Vec::new());
    }

    split_fields(list, CONSTITUENT_SEPARATOR)
        .into_iter()
        .map(|entry| {
            let entry = entry.trim();
            let inner = entry
                .strip_prefix('(')
                .and_then(|e| e.strip_suffix(')'))
                .ok_or_else(|| {
                    NodeError::malformed(line, format!("constituent not parenthesized: {}", entry))
                })?;
            let fields: Vec<&str> = inner.split(CONSTITUENT_FIELD_SEPARATOR).map(str::trim).collect();
            if fields.len() < 3 {
                return Err(NodeError::malformed(
                    line,
                    format!("constituent needs timestamp, id and type: {}", entry),
                ));
            }
            let timestamp = parse_timestamp(fields[0]).map_err(|e| rewrap(line, e))?;
            let attributes = fields[3..].iter().map(|a| a.to_string()).collect();
            Ok(SimpleEvent::new(fields[1], timestamp, fields[2], attributes))
        })
        .collect()
}

/// Split like the legacy senders do: trailing empty fields are dropped.
fn split_fields(text: &str, separator: char) -> Vec<&str> {
    let mut parts: Vec<&str> = text.split(separator).collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// Report timestamp errors against the whole line rather than the field
fn rewrap(line: &str, error: NodeError) -> NodeError {
    match error {
        NodeError::MalformedEvent { message, .. } => NodeError::malformed(line, message),
        other => other,
    }
}
