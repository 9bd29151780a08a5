// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-of-day timestamps.
//!
//! Event timestamps are microseconds since local midnight, serialized as
//! `HH:mm:ss:SSSSSS`. The parser accepts hours above 23, the formatter does not,
//! so a node that runs across midnight will fail to forward events stamped after
//! the rollover.

use crate::core::error::{NodeError, NodeResult};
use chrono::{Local, Timelike};

/// Microseconds since local midnight
pub type Timestamp = i64;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
/// First value that can no longer be formatted
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Format a timestamp as `HH:mm:ss:SSSSSS`
pub fn format_timestamp(timestamp: Timestamp) -> NodeResult<String> {
    if !(0..MICROS_PER_DAY).contains(&timestamp) {
        return Err(NodeError::TimestampOutOfRange { timestamp });
    }
    let hours = timestamp / MICROS_PER_HOUR;
    let minutes = (timestamp % MICROS_PER_HOUR) / MICROS_PER_MINUTE;
    let seconds = (timestamp % MICROS_PER_MINUTE) / MICROS_PER_SECOND;
    let micros = timestamp % MICROS_PER_SECOND;
    Ok(format!(
        "{:02}:{:02}:{:02}:{:06}",
        hours, minutes, seconds, micros
    ))
}

/// Parse a `HH:mm:ss[:SSSSSS]` timestamp.
///
/// At least three fields are required. The microsecond field is only honoured
/// when exactly four fields are present.
pub fn parse_timestamp(text: &str) -> NodeResult<Timestamp> {
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() < 3 {
        return Err(NodeError::malformed(
            text,
            format!("timestamp needs at least 3 fields, got {}", fields.len()),
        ));
    }

    let field = |index: usize| -> NodeResult<i64> {
        fields[index].parse::<i64>().map_err(|e| {
            NodeError::malformed(text, format!("invalid timestamp field '{}': {}", fields[index], e))
        })
    };

    let scaled = |index: usize, unit: i64| -> NodeResult<i64> {
        field(index)?
            .checked_mul(unit)
            .ok_or_else(|| NodeError::malformed(text, "timestamp out of range"))
    };
    let add = |a: i64, b: i64| -> NodeResult<i64> {
        a.checked_add(b)
            .ok_or_else(|| NodeError::malformed(text, "timestamp out of range"))
    };

    let mut timestamp = scaled(0, MICROS_PER_HOUR)?;
    timestamp = add(timestamp, scaled(1, MICROS_PER_MINUTE)?)?;
    timestamp = add(timestamp, scaled(2, MICROS_PER_SECOND)?)?;
    if fields.len() == 4 {
        timestamp = add(timestamp, field(3)?)?;
    }
    Ok(timestamp)
}

/// Current local time of day in microseconds
pub fn now_micros_of_day() -> Timestamp {
    let now = Local::now().time();
    now.num_seconds_from_midnight() as i64 * MICROS_PER_SECOND
        + (now.nanosecond() % 1_000_000_000) as i64 / 1_000
}
