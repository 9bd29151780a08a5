// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP Event Sender
//!
//! Forwards result events to successor nodes, one line per event.
//!
//! ## Architecture
//!
//! ```text
//! Event → SinkMapper → line → fan-out (broadcast | round robin) → cached TCP connections
//! ```
//!
//! Connections are opened lazily on first use and then kept for the lifetime of the
//! sender. The sender is synchronous: async socket operations run on an internal
//! tokio runtime.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut properties = HashMap::new();
//! properties.insert("tcp.send.mode".to_string(), "round_robin".to_string());
//! properties.insert("tcp.destinations".to_string(), "10.0.0.2:5502,10.0.0.3:5503".to_string());
//!
//! let mut sender = TcpEventSender::from_properties(&properties)?;
//! sender.send(&event)?;
//! sender.stop();
//! ```

use super::sink_trait::Sink;
use crate::core::config::address::TcpAddress;
use crate::core::error::{NodeError, NodeResult};
use crate::core::event::codec::END_OF_STREAM;
use crate::core::event::Event;
use crate::core::stream::mapper::{SinkMapper, TextEventMapper};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::runtime::RuntimeFlavor;

/// Fan-out policy over the destination list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Every event goes to every destination
    #[default]
    Broadcast,
    /// Each event goes to the next destination in turn
    RoundRobin,
}

impl FromStr for SendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broadcast" => Ok(SendMode::Broadcast),
            "round_robin" | "round-robin" | "roundrobin" => Ok(SendMode::RoundRobin),
            _ => Err(format!(
                "Invalid send mode '{}': expected 'broadcast' or 'round_robin'",
                s
            )),
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendMode::Broadcast => f.write_str("broadcast"),
            SendMode::RoundRobin => f.write_str("round_robin"),
        }
    }
}

/// Configuration for the TCP sender
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    pub mode: SendMode,
    pub destinations: Vec<TcpAddress>,
    /// Connection establishment timeout in milliseconds (default: 5000)
    pub connect_timeout_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            mode: SendMode::Broadcast,
            destinations: Vec::new(),
            connect_timeout_ms: 5000,
        }
    }
}

impl SenderConfig {
    /// Parse configuration from properties
    ///
    /// # Optional Properties
    /// - `tcp.send.mode`: `broadcast` (default) or `round_robin`
    /// - `tcp.destinations`: Comma-separated `host:port` list (default: none)
    /// - `tcp.connect.timeout.ms`: Connection timeout (default: 5000)
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(mode) = properties.get("tcp.send.mode") {
            config.mode = mode.parse()?;
        }

        if let Some(destinations) = properties.get("tcp.destinations") {
            config.destinations = destinations
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| {
                    d.parse::<TcpAddress>()
                        .map_err(|e| format!("Invalid tcp.destinations: {}", e))
                })
                .collect::<Result<_, _>>()?;
        }

        if let Some(timeout) = properties.get("tcp.connect.timeout.ms") {
            config.connect_timeout_ms = timeout
                .parse()
                .map_err(|e| format!("Invalid tcp.connect.timeout.ms: {}", e))?;
        }

        Ok(config)
    }
}

/// Round-robin position over a destination list
#[derive(Debug, Clone, Default)]
struct FanOut {
    next: usize,
}

impl FanOut {
    /// Indices of the destinations the next event goes to
    fn targets(&mut self, mode: SendMode, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        match mode {
            SendMode::Broadcast => (0..len).collect(),
            SendMode::RoundRobin => {
                let index = self.next % len;
                self.next = (index + 1) % len;
                vec![index]
            }
        }
    }
}

/// Forwards events to successor nodes over TCP
pub struct TcpEventSender {
    config: SenderConfig,
    mapper: Box<dyn SinkMapper>,
    fan_out: FanOut,
    connections: HashMap<TcpAddress, TcpStream>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl fmt::Debug for TcpEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpEventSender")
            .field("config", &self.config)
            .field("connected", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TcpEventSender {
    pub fn new(config: SenderConfig) -> Self {
        Self::with_mapper(config, Box::new(TextEventMapper::new()))
    }

    pub fn with_mapper(config: SenderConfig, mapper: Box<dyn SinkMapper>) -> Self {
        Self {
            config,
            mapper,
            fan_out: FanOut::default(),
            connections: HashMap::new(),
            runtime: None,
        }
    }

    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, String> {
        Ok(Self::new(SenderConfig::from_properties(properties)?))
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Number of destinations with an open connection
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Write an already serialized payload under the fan-out policy
    pub fn publish(&mut self, payload: &[u8]) -> NodeResult<()> {
        let targets: Vec<TcpAddress> = self
            .fan_out
            .targets(self.config.mode, self.config.destinations.len())
            .into_iter()
            .map(|i| self.config.destinations[i].clone())
            .collect();
        if targets.is_empty() {
            log::debug!("[TcpEventSender] No destinations configured, dropping payload");
            return Ok(());
        }
        self.write_to(&targets, payload)
    }

    /// Tell every destination that this node's stream is complete
    pub fn send_end_of_stream(&mut self) -> NodeResult<()> {
        let targets = self.config.destinations.clone();
        let line = format!("{}\n", END_OF_STREAM);
        log::info!(
            "[TcpEventSender] Sending end-of-stream to {} destination(s)",
            targets.len()
        );
        self.write_to(&targets, line.as_bytes())
    }

    /// Open connections to every destination that is not connected yet
    pub fn connect_all(&mut self) -> NodeResult<()> {
        let targets = self.config.destinations.clone();
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connections = &mut self.connections;
        Self::block_on(&mut self.runtime, async move {
            for destination in &targets {
                if !connections.contains_key(destination) {
                    let stream = Self::connect(destination, timeout).await?;
                    connections.insert(destination.clone(), stream);
                }
            }
            Ok::<(), NodeError>(())
        })?
    }

    fn write_to(&mut self, targets: &[TcpAddress], payload: &[u8]) -> NodeResult<()> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connections = &mut self.connections;
        Self::block_on(&mut self.runtime, async move {
            for destination in targets {
                if !connections.contains_key(destination) {
                    let stream = Self::connect(destination, timeout).await?;
                    connections.insert(destination.clone(), stream);
                }
                let Some(stream) = connections.get_mut(destination) else {
                    continue;
                };
                let written = match stream.write_all(payload).await {
                    Ok(()) => stream.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    connections.remove(destination);
                    log::error!("[TcpEventSender] Write to {} failed: {}", destination, e);
                    return Err(NodeError::forwarding_failure(destination, e));
                }
            }
            Ok::<(), NodeError>(())
        })?
    }

    async fn connect(destination: &TcpAddress, timeout: Duration) -> NodeResult<TcpStream> {
        log::info!("[TcpEventSender] Connecting to {}", destination);
        let attempt = async {
            let mut last_error = None;
            let addresses = tokio::net::lookup_host((destination.host(), destination.port()))
                .await
                .map_err(|e| NodeError::forwarding_failure(destination, e))?;
            for address in addresses {
                let socket = if address.is_ipv4() {
                    TcpSocket::new_v4()
                } else {
                    TcpSocket::new_v6()
                }
                .map_err(|e| NodeError::forwarding_failure(destination, e))?;
                socket
                    .set_keepalive(true)
                    .map_err(|e| NodeError::forwarding_failure(destination, e))?;
                match socket.connect(address).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_error = Some(e),
                }
            }
            Err::<TcpStream, NodeError>(match last_error {
                Some(e) => NodeError::forwarding_failure(destination, e),
                None => NodeError::forwarding_failure_msg(destination, "host did not resolve"),
            })
        };

        let stream = tokio::time::timeout(timeout, attempt).await.map_err(|_| {
            NodeError::forwarding_failure_msg(
                destination,
                format!("connection timed out after {}ms", timeout.as_millis()),
            )
        })??;
        stream
            .set_nodelay(true)
            .map_err(|e| NodeError::forwarding_failure(destination, e))?;

        log::info!(
            "[TcpEventSender] Connection for forwarding events to {} established",
            destination
        );
        Ok(stream)
    }

    /// Run a future to completion from synchronous code.
    ///
    /// Inside a multi-threaded runtime the caller's runtime drives the future. A
    /// current-thread runtime cannot block in place, so the sender's own runtime runs
    /// it on a helper thread instead.
    fn block_on<F>(runtime: &mut Option<tokio::runtime::Runtime>, future: F) -> NodeResult<F::Output>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let inside_runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                // Use block_in_place to avoid nested runtime panic
                return Ok(tokio::task::block_in_place(|| handle.block_on(future)));
            }
            Ok(_) => true,
            Err(_) => false,
        };

        if runtime.is_none() {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| NodeError::Runtime {
                    message: "Failed to create tokio runtime".to_string(),
                    source: Some(Box::new(e)),
                })?;
            *runtime = Some(rt);
        }
        let rt = runtime
            .as_ref()
            .ok_or_else(|| NodeError::runtime("Tokio runtime not initialized"))?;
        if !inside_runtime {
            return Ok(rt.block_on(future));
        }
        std::thread::scope(|scope| {
            scope
                .spawn(|| rt.block_on(future))
                .join()
                .map_err(|_| NodeError::runtime("TcpEventSender I/O thread panicked"))
        })
    }
}

impl Clone for TcpEventSender {
    fn clone(&self) -> Self {
        // Clone creates a new sender with the same config but no connections
        Self::with_mapper(self.config.clone(), self.mapper.clone())
    }
}

impl Sink for TcpEventSender {
    fn start(&mut self) -> NodeResult<()> {
        log::info!(
            "[TcpEventSender] Forwarding in {} mode to {:?}",
            self.config.mode,
            self.config
                .destinations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    fn send(&mut self, event: &Event) -> NodeResult<()> {
        let payload = self.mapper.map(std::slice::from_ref(event))?;
        self.publish(&payload)
    }

    fn finish(&mut self) -> NodeResult<()> {
        self.send_end_of_stream()
    }

    fn stop(&mut self) {
        log::info!("[TcpEventSender] Stopping...");
        let connections = std::mem::take(&mut self.connections);
        let shutdown = async move {
            for (destination, mut stream) in connections {
                if let Err(e) = stream.shutdown().await {
                    log::warn!("[TcpEventSender] Error closing connection to {}: {}", destination, e);
                }
            }
        };
        if let Err(e) = Self::block_on(&mut self.runtime, shutdown) {
            log::warn!("[TcpEventSender] No runtime available for graceful shutdown: {}", e);
        }
        log::info!("[TcpEventSender] Stopped");
    }

    fn clone_box(&self) -> Box<dyn Sink> {
        Box::new(self.clone())
    }

    fn validate_connectivity(&mut self) -> NodeResult<()> {
        self.connect_all()
    }
}

impl Drop for TcpEventSender {
    fn drop(&mut self) {
        if !self.connections.is_empty() {
            self.stop();
        }
        // dropping a runtime from async code panics
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}
