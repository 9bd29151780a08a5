// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod address;
pub mod flat_config;
pub mod node_config;

pub use address::TcpAddress;
pub use flat_config::{FlatConfig, PropertySource};
pub use node_config::{AddressBook, ForwardingConfig, NodeConfig};
