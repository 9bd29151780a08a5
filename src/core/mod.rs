// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod config;
pub mod error;
pub mod event;
pub mod node_runtime;
pub mod query;
pub mod stream;
pub mod util;

pub use self::error::{NodeError, NodeResult};
pub use self::node_runtime::{ComputeNode, NodeStats, PatternEngine, RelayEngine};
