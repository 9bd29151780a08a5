// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Node Configuration
//!
//! A node is described by two JSON files:
//!
//! - the **local config**, whose `forwarding` section names the node, its
//!   successors and how many predecessors will connect
//! - the **global address book**, mapping every node id to `host:port`
//!
//! ```json
//! {"forwarding": {"send_mode": "broadcast", "recipient": [2, 3],
//!                 "node_id": 1, "connections_to_establish": [0]}}
//! ```
//! ```json
//! {"0": "localhost:5500", "1": "localhost:5501", "2": "localhost:5502"}
//! ```
//!
//! Other sections of the local config (query processing) are ignored here.

use super::address::TcpAddress;
use super::flat_config::{FlatConfig, PropertySource};
use crate::core::error::{NodeError, NodeResult};
use crate::core::stream::output::sink::SendMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Node id → address
pub type AddressBook = BTreeMap<u32, TcpAddress>;

/// The `forwarding` section of a node's local config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingConfig {
    pub send_mode: String,
    /// Successor node ids
    #[serde(default)]
    pub recipient: Vec<u32>,
    pub node_id: u32,
    /// Predecessor node ids; only their number matters
    #[serde(default)]
    pub connections_to_establish: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct LocalConfigFile {
    forwarding: ForwardingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub forwarding: ForwardingConfig,
    pub address_book: AddressBook,
}

impl NodeConfig {
    /// Listening port of a node that has no address book entry of its own
    pub const BASE_PORT: u16 = 5500;

    /// Read the local config and the global address book
    pub fn load(local: impl AsRef<Path>, global: impl AsRef<Path>) -> NodeResult<Self> {
        let local_json = read_file(local.as_ref())?;
        let global_json = read_file(global.as_ref())?;
        Self::from_json(&local_json, &global_json)
    }

    pub fn from_json(local: &str, global: &str) -> NodeResult<Self> {
        let local: LocalConfigFile = serde_json::from_str(local)
            .map_err(|e| NodeError::configuration(format!("Invalid local config: {}", e)))?;
        let address_book: AddressBook = serde_json::from_str(global)
            .map_err(|e| NodeError::configuration(format!("Invalid address book: {}", e)))?;

        let config = Self {
            forwarding: local.forwarding,
            address_book,
        };
        // fail early on anything the transports would reject later
        config.send_mode()?;
        config.destinations()?;

        log::info!(
            "[NodeConfig] node {}: send mode {}, recipients {:?}, {} predecessor(s)",
            config.forwarding.node_id,
            config.forwarding.send_mode,
            config.forwarding.recipient,
            config.forwarding.connections_to_establish.len()
        );
        Ok(config)
    }

    pub fn node_id(&self) -> u32 {
        self.forwarding.node_id
    }

    pub fn own_address(&self) -> Option<&TcpAddress> {
        self.address_book.get(&self.forwarding.node_id)
    }

    /// Port of the node's own address book entry, or `BASE_PORT + node_id`
    pub fn listen_port(&self) -> NodeResult<u16> {
        if let Some(address) = self.own_address() {
            return Ok(address.port());
        }
        log::info!(
            "[NodeConfig] No address book entry for node {}, using base port {}",
            self.forwarding.node_id,
            Self::BASE_PORT
        );
        u16::try_from(self.forwarding.node_id)
            .ok()
            .and_then(|id| Self::BASE_PORT.checked_add(id))
            .ok_or_else(|| {
                NodeError::configuration(format!(
                    "Node id {} does not map to a valid port",
                    self.forwarding.node_id
                ))
            })
    }

    pub fn send_mode(&self) -> NodeResult<SendMode> {
        self.forwarding
            .send_mode
            .parse()
            .map_err(|e: String| NodeError::configuration_with_key(e, "forwarding.send_mode"))
    }

    /// Addresses of all recipients, in configured order
    pub fn destinations(&self) -> NodeResult<Vec<TcpAddress>> {
        self.forwarding
            .recipient
            .iter()
            .map(|id| {
                self.address_book.get(id).cloned().ok_or_else(|| {
                    NodeError::configuration_with_key(
                        format!(
                            "The address book does not have an entry for the destination node ID {}",
                            id
                        ),
                        "forwarding.recipient",
                    )
                })
            })
            .collect()
    }

    pub fn expected_connections(&self) -> usize {
        self.forwarding.connections_to_establish.len()
    }

    /// Flatten into the properties understood by the transport configs
    pub fn to_flat_config(&self) -> NodeResult<FlatConfig> {
        let mut config = FlatConfig::new();
        config.set("tcp.poll.timeout.ms", "10", PropertySource::Default);
        config.set("watermark.strategy", "per_connection_minimum", PropertySource::Default);

        config.set("tcp.port", self.listen_port()?.to_string(), PropertySource::AddressBook);
        let destinations = self
            .destinations()?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        config.set("tcp.destinations", destinations, PropertySource::AddressBook);

        config.set(
            "tcp.connections",
            self.expected_connections().to_string(),
            PropertySource::LocalConfig,
        );
        config.set("tcp.send.mode", self.send_mode()?.to_string(), PropertySource::LocalConfig);
        Ok(config)
    }
}

fn read_file(path: &Path) -> NodeResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        NodeError::configuration(format!("Failed to read {}: {}", path.display(), e))
    })
}
