// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TCP Event Receiver
//!
//! Accepts the connections of all predecessor nodes and fuses their event streams
//! into one watermarked queue.
//!
//! ## Architecture
//!
//! One receiver thread with an internal single-threaded tokio runtime:
//! ```text
//! N sockets → LineReader (per socket) → SourceMapper → WatermarkCoordinator → queue → dequeue()
//! ```
//!
//! The thread first accepts until the expected number of predecessors is connected,
//! closes the listening socket, then waits for readiness on all connections at once
//! with a short timeout so that [`TcpEventReceiver::cancel`] is noticed promptly.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut receiver = TcpEventReceiver::new(ReceiverConfig {
//!     port: 5501,
//!     expected_connections: 2,
//!     ..Default::default()
//! });
//! receiver.start()?;
//! while let Some(item) = receiver.dequeue() {
//!     engine.on_event(&item.event, item.watermark);
//! }
//! ```

use super::EventWithWatermark;
use crate::core::error::{NodeError, NodeResult};
use crate::core::event::codec::{END_OF_STREAM, FIELD_SEPARATOR};
use crate::core::event::Timestamp;
use crate::core::stream::input::line_reader::LineReader;
use crate::core::stream::input::watermark::{
    ConnectionId, WatermarkCoordinator, WatermarkStrategy, FINISHED,
};
use crate::core::stream::mapper::{SourceMapper, TextEventMapper};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Configuration for the TCP receiver
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// Interface to listen on (default: 0.0.0.0)
    pub host: String,
    /// Listening port, 0 picks a free port
    pub port: u16,
    /// Number of predecessor connections to accept before reading
    pub expected_connections: usize,
    /// Readiness wait timeout in milliseconds (default: 10)
    pub poll_timeout_ms: u64,
    pub watermark_strategy: WatermarkStrategy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            expected_connections: 1,
            poll_timeout_ms: 10,
            watermark_strategy: WatermarkStrategy::default(),
        }
    }
}

impl ReceiverConfig {
    /// Parse configuration from properties
    ///
    /// # Required Properties
    /// - `tcp.port`: Listening port
    /// - `tcp.connections`: Number of predecessor connections
    ///
    /// # Optional Properties
    /// - `tcp.host`: Listening interface (default: 0.0.0.0)
    /// - `tcp.poll.timeout.ms`: Readiness wait timeout (default: 10)
    /// - `watermark.strategy`: `per_connection_minimum` (default) or `wall_clock_counter`
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, String> {
        let mut config = Self::default();

        config.port = properties
            .get("tcp.port")
            .ok_or("Missing required property: tcp.port")?
            .parse()
            .map_err(|e| format!("Invalid tcp.port: {}", e))?;

        config.expected_connections = properties
            .get("tcp.connections")
            .ok_or("Missing required property: tcp.connections")?
            .parse()
            .map_err(|e| format!("Invalid tcp.connections: {}", e))?;

        if let Some(host) = properties.get("tcp.host") {
            config.host = host.clone();
        }

        if let Some(timeout) = properties.get("tcp.poll.timeout.ms") {
            config.poll_timeout_ms = timeout
                .parse()
                .map_err(|e| format!("Invalid tcp.poll.timeout.ms: {}", e))?;
            if config.poll_timeout_ms == 0 {
                return Err("Invalid tcp.poll.timeout.ms: must be greater than 0".to_string());
            }
        }

        if let Some(strategy) = properties.get("watermark.strategy") {
            config.watermark_strategy = strategy.parse()?;
        }

        Ok(config)
    }

    fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Lifecycle of the receiver as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    Idle = 0,
    AcceptingInitialConnections = 1,
    Running = 2,
    /// Every predecessor connection has closed
    Finished = 3,
    Cancelled = 4,
    /// The receiver thread stopped on an error
    Failed = 5,
}

impl ReceiverState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::AcceptingInitialConnections,
            2 => Self::Running,
            3 => Self::Finished,
            4 => Self::Cancelled,
            5 => Self::Failed,
            _ => Self::Idle,
        }
    }

    /// No further events will be queued
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed)
    }
}

/// A registered predecessor connection, owned by the receiver loop
struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: LineReader<TcpStream>,
}

/// What the loop should do with a connection after pulling it
enum PullOutcome {
    Open,
    Closed,
}

/// State shared between the receiver thread and its owner
#[derive(Debug, Clone)]
struct Shared {
    running: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    watermark: Arc<AtomicI64>,
}

impl Shared {
    fn set_state(&self, state: ReceiverState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> ReceiverState {
        ReceiverState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Marks the receiver failed when its thread exits, by error or panic, without
/// reaching a terminal state
struct FailOnExit {
    shared: Shared,
}

impl Drop for FailOnExit {
    fn drop(&mut self) {
        if !self.shared.state().is_terminal() {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.set_state(ReceiverState::Failed);
        }
    }
}

/// Receives events from all predecessors over TCP
#[derive(Debug)]
pub struct TcpEventReceiver {
    config: ReceiverConfig,
    mapper: Box<dyn SourceMapper>,
    shared: Shared,
    queue_tx: Option<Sender<EventWithWatermark>>,
    queue_rx: Receiver<EventWithWatermark>,
    local_addr: Option<SocketAddr>,
    worker: Option<JoinHandle<NodeResult<()>>>,
}

impl TcpEventReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_mapper(config, Box::new(TextEventMapper::new()))
    }

    pub fn with_mapper(config: ReceiverConfig, mapper: Box<dyn SourceMapper>) -> Self {
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            mapper,
            shared: Shared {
                running: Arc::new(AtomicBool::new(false)),
                state: Arc::new(AtomicU8::new(ReceiverState::Idle as u8)),
                watermark: Arc::new(AtomicI64::new(Timestamp::MIN)),
            },
            queue_tx: Some(queue_tx),
            queue_rx,
            local_addr: None,
            worker: None,
        }
    }

    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, String> {
        Ok(Self::new(ReceiverConfig::from_properties(properties)?))
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bind the listening socket and start the receiver thread.
    ///
    /// Binding happens before this returns, so a port conflict is reported here as
    /// `BindFailure`. Returns the bound address.
    pub fn start(&mut self) -> NodeResult<SocketAddr> {
        let queue_tx = self
            .queue_tx
            .take()
            .ok_or_else(|| NodeError::runtime("TcpEventReceiver already started"))?;

        let address = self.config.bind_address();
        let listener = std::net::TcpListener::bind(&address)
            .map_err(|e| NodeError::bind_failure(&address, e))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        log::info!(
            "[TcpEventReceiver] Listening on {}, waiting for {} predecessor connection(s)",
            local_addr,
            self.config.expected_connections
        );

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(ReceiverState::AcceptingInitialConnections);

        let config = self.config.clone();
        let mapper = self.mapper.clone();
        let shared = self.shared.clone();
        let worker = thread::Builder::new()
            .name(format!("tcp-receiver-{}", local_addr.port()))
            .spawn(move || {
                let _fail_on_exit = FailOnExit {
                    shared: shared.clone(),
                };
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| NodeError::Runtime {
                        message: "Failed to create tokio runtime".to_string(),
                        source: Some(Box::new(e)),
                    })?;
                let result = rt.block_on(Self::receive_loop(config, listener, mapper, shared, queue_tx));
                if let Err(ref e) = result {
                    log::error!("[TcpEventReceiver] Receiver stopped: {}", e);
                }
                result
            })
            .map_err(|e| NodeError::Runtime {
                message: "Failed to spawn receiver thread".to_string(),
                source: Some(Box::new(e)),
            })?;
        self.worker = Some(worker);

        Ok(local_addr)
    }

    /// Blocking pop of the next event.
    ///
    /// Returns `None` once the receiver has finished or was cancelled and every
    /// queued event has been taken, or if the receiver was never started.
    pub fn dequeue(&self) -> Option<EventWithWatermark> {
        if self.queue_tx.is_some() {
            return self.queue_rx.try_recv().ok();
        }
        self.queue_rx.recv().ok()
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<EventWithWatermark> {
        if self.queue_tx.is_some() {
            return self.queue_rx.try_recv().ok();
        }
        match self.queue_rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.queue_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue_rx.is_empty()
    }

    /// Current global watermark
    pub fn watermark(&self) -> Timestamp {
        self.shared.watermark.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }

    /// True once no further event can arrive and the queue is drained.
    ///
    /// Also true when the receiver thread has exited for any reason; [`join`](Self::join)
    /// then reports how it ended.
    pub fn is_exhausted(&self) -> bool {
        let stopped = self.state().is_terminal()
            || self.worker.as_ref().is_some_and(|worker| worker.is_finished());
        stopped && self.queue_rx.is_empty()
    }

    /// Address of the listening socket, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Ask the receiver thread to stop. Queued events stay available.
    pub fn cancel(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            log::info!("[TcpEventReceiver] Stopping...");
        }
    }

    /// Wait for the receiver thread and return how it ended
    pub fn join(&mut self) -> NodeResult<()> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| NodeError::runtime("TcpEventReceiver thread panicked"))?,
            None => Ok(()),
        }
    }

    async fn receive_loop(
        config: ReceiverConfig,
        listener: std::net::TcpListener,
        mapper: Box<dyn SourceMapper>,
        shared: Shared,
        queue: Sender<EventWithWatermark>,
    ) -> NodeResult<()> {
        let listener = TcpListener::from_std(listener)?;
        let mut connections = Vec::with_capacity(config.expected_connections);

        while connections.len() < config.expected_connections {
            if !shared.running.load(Ordering::SeqCst) {
                shared.set_state(ReceiverState::Cancelled);
                log::info!("[TcpEventReceiver] Cancelled while accepting connections");
                return Ok(());
            }

            // Use timeout to periodically check running flag
            match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    log::info!("[TcpEventReceiver] Accepted connection from {}", peer);
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("[TcpEventReceiver] Could not set TCP_NODELAY for {}: {}", peer, e);
                    }
                    connections.push(Connection {
                        id: connections.len(),
                        peer,
                        reader: LineReader::new(stream),
                    });
                }
                Ok(Err(e)) => {
                    log::warn!("[TcpEventReceiver] Failed to accept a connection: {}", e);
                }
                Err(_) => continue,
            }
        }
        drop(listener);

        log::info!(
            "[TcpEventReceiver] All {} predecessor connection(s) established",
            connections.len()
        );
        shared.set_state(ReceiverState::Running);

        let poll_timeout = Duration::from_millis(config.poll_timeout_ms);
        let mut coordinator =
            WatermarkCoordinator::new(config.watermark_strategy, config.expected_connections);

        while !connections.is_empty() {
            if !shared.running.load(Ordering::SeqCst) {
                shared.set_state(ReceiverState::Cancelled);
                log::info!(
                    "[TcpEventReceiver] Cancelled, closing {} connection(s)",
                    connections.len()
                );
                return Ok(());
            }

            if !connections.iter().any(|c| c.reader.has_pending()) {
                let readiness = futures::future::select_all(
                    connections
                        .iter()
                        .map(|c| Box::pin(c.reader.get_ref().readable())),
                );
                if tokio::time::timeout(poll_timeout, readiness).await.is_err() {
                    continue;
                }
            }

            let mut closed = Vec::new();
            for connection in connections.iter_mut() {
                let outcome =
                    Self::pull_connection(connection, mapper.as_ref(), &mut coordinator, &queue, &shared);
                if let PullOutcome::Closed = outcome {
                    closed.push(connection.id);
                }
            }
            if !closed.is_empty() {
                connections.retain(|c| !closed.contains(&c.id));
            }
        }

        // also covers a receiver that expects no predecessors
        if coordinator.all_finished() {
            shared.watermark.store(FINISHED, Ordering::SeqCst);
        }
        shared.set_state(ReceiverState::Finished);
        log::info!("[TcpEventReceiver] All predecessors finished their streams");
        Ok(())
    }

    /// Read whatever a connection has available and queue the events it carries
    fn pull_connection(
        connection: &mut Connection,
        mapper: &dyn SourceMapper,
        coordinator: &mut WatermarkCoordinator,
        queue: &Sender<EventWithWatermark>,
        shared: &Shared,
    ) -> PullOutcome {
        let lines = match connection.reader.pull() {
            Ok(Some(lines)) => lines,
            Ok(None) => {
                let error = NodeError::connection_lost(
                    connection.peer,
                    "closed without end-of-stream marker",
                );
                log::warn!("[TcpEventReceiver] {}", error);
                Self::finish_connection(connection, coordinator, shared);
                return PullOutcome::Closed;
            }
            Err(e) => {
                let error = NodeError::connection_lost_with_source(connection.peer, e);
                log::warn!("[TcpEventReceiver] {}", error);
                Self::finish_connection(connection, coordinator, shared);
                return PullOutcome::Closed;
            }
        };

        for line in lines {
            if line.contains(END_OF_STREAM) {
                log::info!("[TcpEventReceiver] Reached the end of the stream for {}", connection.peer);
                Self::finish_connection(connection, coordinator, shared);
                return PullOutcome::Closed;
            }

            if !line.contains(FIELD_SEPARATOR) {
                log::warn!(
                    "[TcpEventReceiver] Invalid message from {} ignored: {:?}",
                    connection.peer,
                    line
                );
                continue;
            }

            let events = match mapper.map(line.as_bytes()) {
                Ok(events) => events,
                Err(e) => {
                    log::warn!("[TcpEventReceiver] Dropping line from {}: {}", connection.peer, e);
                    continue;
                }
            };

            for event in events {
                let watermark = coordinator.observe(connection.id, event.timestamp());
                shared.watermark.store(watermark, Ordering::SeqCst);
                log::trace!("[TcpEventReceiver] Got event {} (watermark {})", event.id(), watermark);
                if queue.send(EventWithWatermark::new(event, watermark)).is_err() {
                    log::debug!("[TcpEventReceiver] Output queue closed, stopping");
                    shared.running.store(false, Ordering::SeqCst);
                    return PullOutcome::Open;
                }
            }
        }
        PullOutcome::Open
    }

    fn finish_connection(
        connection: &Connection,
        coordinator: &mut WatermarkCoordinator,
        shared: &Shared,
    ) {
        let watermark = coordinator.finish(connection.id);
        shared.watermark.store(watermark, Ordering::SeqCst);
        log::info!(
            "[TcpEventReceiver] Closing connection {} (watermark now {})",
            connection.peer,
            watermark
        );
    }
}

impl Drop for TcpEventReceiver {
    fn drop(&mut self) {
        self.cancel();
        if let Err(e) = self.join() {
            log::warn!("[TcpEventReceiver] {}", e);
        }
    }
}
