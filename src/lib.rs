// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport substrate of a distributed complex event processing node.
//!
//! Each node accepts a fixed number of predecessor connections, turns their line
//! based event streams into one queue annotated with watermarks, hands the queue
//! to a pattern engine and forwards the results to its successors.

pub mod core;

pub use crate::core::config::{NodeConfig, TcpAddress};
pub use crate::core::error::{NodeError, NodeResult};
pub use crate::core::event::{ComplexEvent, Event, SimpleEvent, Timestamp};
pub use crate::core::node_runtime::{ComputeNode, NodeStats, PatternEngine, RelayEngine};
