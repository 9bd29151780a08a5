// SPDX-License-Identifier: MIT OR Apache-2.0

//! `host:port` destination addresses as they appear in the address book.

use crate::core::error::NodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A TCP endpoint: `host:port` or `[ipv6]:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TcpAddress {
    host: String,
    port: u16,
}

impl TcpAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);
        Self { host, port }
    }

    /// Host name or IP literal, without brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for TcpAddress {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| NodeError::invalid_address(s, "expected [ipv6]:port"))?;
            (host, port)
        } else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| NodeError::invalid_address(s, "expected host:port"))?;
            if host.contains(':') {
                return Err(NodeError::invalid_address(
                    s,
                    "IPv6 literals must be written as [address]:port",
                ));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(NodeError::invalid_address(s, "empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| NodeError::invalid_address(s, format!("invalid port '{}': {}", port, e)))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for TcpAddress {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TcpAddress> for String {
    fn from(address: TcpAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
