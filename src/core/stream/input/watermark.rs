// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watermark derivation for the fused inbound stream.

use crate::core::event::timestamp::{now_micros_of_day, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Receiver-local connection key
pub type ConnectionId = usize;

/// Watermark value of a connection that will send nothing more
pub const FINISHED: Timestamp = Timestamp::MAX;

/// How the receiver derives its watermark. Selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkStrategy {
    /// Minimum last-seen timestamp over all predecessor connections, minus one
    #[default]
    PerConnectionMinimum,
    /// Local wall clock plus a per-event counter. Ignores per-connection lag.
    WallClockCounter,
}

impl FromStr for WatermarkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "per_connection_minimum" | "minimum" | "min" => Ok(Self::PerConnectionMinimum),
            "wall_clock_counter" | "wall_clock" | "legacy" => Ok(Self::WallClockCounter),
            _ => Err(format!(
                "Invalid watermark strategy '{}': expected 'per_connection_minimum' or 'wall_clock_counter'",
                s
            )),
        }
    }
}

impl fmt::Display for WatermarkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerConnectionMinimum => f.write_str("per_connection_minimum"),
            Self::WallClockCounter => f.write_str("wall_clock_counter"),
        }
    }
}

/// Tracks per-connection progress and derives the global watermark.
///
/// Owned by the receiver loop, so no synchronization is needed here. Once every
/// expected connection has finished the watermark is [`FINISHED`] under either
/// strategy.
#[derive(Debug)]
pub struct WatermarkCoordinator {
    strategy: WatermarkStrategy,
    expected_connections: usize,
    progress: HashMap<ConnectionId, Timestamp>,
    current: Timestamp,
    counter: i64,
    clock: fn() -> Timestamp,
}

impl WatermarkCoordinator {
    pub fn new(strategy: WatermarkStrategy, expected_connections: usize) -> Self {
        Self::with_clock(strategy, expected_connections, now_micros_of_day)
    }

    pub fn with_clock(
        strategy: WatermarkStrategy,
        expected_connections: usize,
        clock: fn() -> Timestamp,
    ) -> Self {
        Self {
            strategy,
            expected_connections,
            progress: HashMap::with_capacity(expected_connections),
            current: Timestamp::MIN,
            counter: 0,
            clock,
        }
    }

    pub fn strategy(&self) -> WatermarkStrategy {
        self.strategy
    }

    pub fn current(&self) -> Timestamp {
        self.current
    }

    /// Record an event from `connection` and return the watermark to attach to it
    pub fn observe(&mut self, connection: ConnectionId, timestamp: Timestamp) -> Timestamp {
        self.progress.insert(connection, timestamp);
        match self.strategy {
            WatermarkStrategy::PerConnectionMinimum => self.advance_to_minimum(),
            WatermarkStrategy::WallClockCounter => {
                self.counter += 1;
                self.current = (self.clock)() + self.counter;
            }
        }
        self.current
    }

    /// Mark `connection` as done, either by sentinel or because it was lost
    pub fn finish(&mut self, connection: ConnectionId) -> Timestamp {
        self.progress.insert(connection, FINISHED);
        match self.strategy {
            WatermarkStrategy::PerConnectionMinimum => self.advance_to_minimum(),
            WatermarkStrategy::WallClockCounter => {
                if self.all_finished() {
                    self.current = FINISHED;
                }
            }
        }
        self.current
    }

    pub fn all_finished(&self) -> bool {
        self.progress.len() >= self.expected_connections
            && self.progress.values().all(|&ts| ts == FINISHED)
    }

    fn advance_to_minimum(&mut self) {
        if self.progress.len() < self.expected_connections {
            return;
        }
        let candidate = match self.progress.values().min() {
            None | Some(&FINISHED) => FINISHED,
            Some(&min) => min.saturating_sub(1),
        };
        if candidate > self.current {
            log::trace!("[WatermarkCoordinator] watermark {} -> {}", self.current, candidate);
            self.current = candidate;
        }
    }
}
