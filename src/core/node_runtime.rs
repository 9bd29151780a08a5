// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime of a single compute node: receive, evaluate, forward.

use crate::core::config::{FlatConfig, NodeConfig, PropertySource};
use crate::core::error::{NodeError, NodeResult};
use crate::core::event::{Event, Timestamp};
use crate::core::stream::input::source::{ReceiverConfig, ReceiverState, TcpEventReceiver};
use crate::core::stream::input::WatermarkStrategy;
use crate::core::stream::output::sink::{LogSink, SenderConfig, Sink, TcpEventSender};
use crate::core::util::ShutdownHandle;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(50);

/// Consumes events in arrival order together with the watermark current at their
/// arrival, and produces result events.
pub trait PatternEngine: Debug + Send {
    fn on_event(&mut self, event: &Event, watermark: Timestamp) -> Vec<Event>;

    /// Called once after the last event when every predecessor signalled
    /// end-of-stream. Returns results that were held back waiting for more input.
    fn on_end_of_input(&mut self) -> Vec<Event> {
        Vec::new()
    }
}

/// Forwards every event unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayEngine;

impl PatternEngine for RelayEngine {
    fn on_event(&mut self, event: &Event, _watermark: Timestamp) -> Vec<Event> {
        vec![event.clone()]
    }
}

/// Counters reported when a node finishes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub events_received: u64,
    pub events_forwarded: u64,
    pub send_errors: u64,
}

#[derive(Debug)]
pub struct ComputeNode {
    node_id: u32,
    receiver: TcpEventReceiver,
    engine: Box<dyn PatternEngine>,
    sink: Box<dyn Sink>,
    shutdown: ShutdownHandle,
}

impl ComputeNode {
    pub fn new(
        node_id: u32,
        receiver: TcpEventReceiver,
        engine: Box<dyn PatternEngine>,
        sink: Box<dyn Sink>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            node_id,
            receiver,
            engine,
            sink,
            shutdown,
        }
    }

    /// Build a node from its configuration files.
    ///
    /// A node without recipients logs its results instead of forwarding them.
    pub fn from_config(
        config: &NodeConfig,
        watermark: Option<WatermarkStrategy>,
        engine: Box<dyn PatternEngine>,
        shutdown: ShutdownHandle,
    ) -> NodeResult<Self> {
        let mut flat = config.to_flat_config()?;
        if let Some(strategy) = watermark {
            flat.set("watermark.strategy", strategy.to_string(), PropertySource::CommandLine);
        }
        Self::from_flat_config(config.node_id(), &flat, engine, shutdown)
    }

    pub fn from_flat_config(
        node_id: u32,
        flat: &FlatConfig,
        engine: Box<dyn PatternEngine>,
        shutdown: ShutdownHandle,
    ) -> NodeResult<Self> {
        let receiver_config = ReceiverConfig::from_properties(flat.properties())
            .map_err(NodeError::configuration)?;
        let sender_config = SenderConfig::from_properties(flat.properties())
            .map_err(NodeError::configuration)?;

        let sink: Box<dyn Sink> = if sender_config.destinations.is_empty() {
            Box::new(LogSink::with_prefix(format!("[node {}]", node_id)))
        } else {
            Box::new(TcpEventSender::new(sender_config))
        };

        Ok(Self::new(
            node_id,
            TcpEventReceiver::new(receiver_config),
            engine,
            sink,
            shutdown,
        ))
    }

    /// Bind the listening socket and start accepting predecessors
    pub fn start(&mut self) -> NodeResult<SocketAddr> {
        self.sink.start()?;
        let address = self.receiver.start()?;
        log::info!("[ComputeNode] Node {} listening on {}", self.node_id, address);
        Ok(address)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.local_addr()
    }

    /// Process events until every predecessor finished or shutdown is requested.
    ///
    /// Starts the node first if [`start`](Self::start) was not called. A fatal sink
    /// error or a failure of the receiver thread ends the run and is returned.
    pub fn run(mut self) -> NodeResult<NodeStats> {
        if self.receiver.state() == ReceiverState::Idle {
            self.start()?;
        }

        let mut stats = NodeStats::default();
        let result = self.process(&mut stats);
        if result.is_err() {
            self.receiver.cancel();
        }
        let joined = self.receiver.join();
        let finished = result.and(joined).and_then(|()| self.complete(&mut stats));
        self.sink.stop();

        finished.map(|()| {
            log::info!(
                "[ComputeNode] Node {} done: {} received, {} forwarded, {} dropped",
                self.node_id,
                stats.events_received,
                stats.events_forwarded,
                stats.send_errors
            );
            stats
        })
    }

    fn process(&mut self, stats: &mut NodeStats) -> NodeResult<()> {
        loop {
            if self.shutdown.is_shutdown() {
                self.receiver.cancel();
            }
            match self.receiver.dequeue_timeout(DEQUEUE_TIMEOUT) {
                Some(item) => {
                    stats.events_received += 1;
                    log::trace!(
                        "[ComputeNode] {} at watermark {}",
                        item.event.id(),
                        item.watermark
                    );
                    for result in self.engine.on_event(&item.event, item.watermark) {
                        self.forward(&result, stats)?;
                    }
                }
                None if self.receiver.is_exhausted() => return Ok(()),
                None => {}
            }
        }
    }

    /// Flush held-back results and tell successors that the stream ended
    fn complete(&mut self, stats: &mut NodeStats) -> NodeResult<()> {
        if self.receiver.state() != ReceiverState::Finished {
            log::info!("[ComputeNode] Node {} cancelled", self.node_id);
            return Ok(());
        }
        for result in self.engine.on_end_of_input() {
            self.forward(&result, stats)?;
        }
        self.sink.finish()
    }

    fn forward(&mut self, event: &Event, stats: &mut NodeStats) -> NodeResult<()> {
        if let Event::Complex(complex) = event {
            if let Some(latency) = complex.latency_ms() {
                log::debug!("[ComputeNode] {} latency {:.3} ms", complex.composite_id(), latency);
            }
        }
        match self.sink.send(event) {
            Ok(()) => {
                stats.events_forwarded += 1;
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                log::error!("[ComputeNode] Node {} cannot forward {}: {}", self.node_id, event.id(), e);
                Err(e)
            }
            Err(e) => {
                log::warn!("[ComputeNode] Dropping result {}: {}", event.id(), e);
                stats.send_errors += 1;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{ComplexEvent, SimpleEvent};
    use crate::core::query::OutputSelection;
    use crate::core::stream::mapper::SourceMapper;
    use crate::core::util::ShutdownCoordinator;
    use std::io::Write;
    use std::net::TcpStream;

    fn receiver(connections: usize) -> TcpEventReceiver {
        TcpEventReceiver::new(ReceiverConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            expected_connections: connections,
            ..ReceiverConfig::default()
        })
    }

    /// Emits an `AND(A,B)` match for every B following an A
    #[derive(Debug)]
    struct PairEngine {
        last_a: Option<Event>,
        selection: OutputSelection,
        held: Vec<Event>,
    }

    impl PatternEngine for PairEngine {
        fn on_event(&mut self, event: &Event, _watermark: Timestamp) -> Vec<Event> {
            match event.event_type() {
                "A" => {
                    self.last_a = Some(event.clone());
                    Vec::new()
                }
                "B" => match &self.last_a {
                    Some(a) => {
                        let matched = [a.clone(), event.clone()];
                        vec![Event::Complex(self.selection.select(&matched))]
                    }
                    None => {
                        self.held.push(event.clone());
                        Vec::new()
                    }
                },
                _ => Vec::new(),
            }
        }

        fn on_end_of_input(&mut self) -> Vec<Event> {
            std::mem::take(&mut self.held)
        }
    }

    #[test]
    fn test_relay_forwards_until_end_of_stream() {
        let sink = LogSink::new();
        let mut node = ComputeNode::new(
            1,
            receiver(1),
            Box::new(RelayEngine),
            Box::new(sink.clone()),
            ShutdownHandle::detached(),
        );
        let address = node.start().unwrap();

        let mut peer = TcpStream::connect(address).unwrap();
        peer.write_all(b"simple | e1 | 10:00:00:000001 | A | x\n").unwrap();
        peer.write_all(b"simple | e2 | 10:00:00:000002 | B\nend-of-the-stream\n")
            .unwrap();

        let stats = node.run().unwrap();
        assert_eq!(stats.events_received, 2);
        assert_eq!(stats.events_forwarded, 2);
        let ids: Vec<String> = sink.received().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_engine_results_and_held_back_events() {
        let sink = LogSink::new();
        let engine = PairEngine {
            last_a: None,
            selection: OutputSelection::new("AND(A,B)", ["A", "B"], 2),
            held: Vec::new(),
        };
        let mut node = ComputeNode::new(
            2,
            receiver(1),
            Box::new(engine),
            Box::new(sink.clone()),
            ShutdownHandle::detached(),
        );
        let address = node.start().unwrap();

        let mut peer = TcpStream::connect(address).unwrap();
        let lines = [
            SimpleEvent::new("b0", 5, "B", vec![]),
            SimpleEvent::new("a1", 10, "A", vec![]),
            SimpleEvent::new("b1", 20, "B", vec![]),
        ];
        for event in &lines {
            writeln!(peer, "{}", event.encode().unwrap()).unwrap();
        }
        peer.write_all(b"end-of-the-stream\n").unwrap();

        let stats = node.run().unwrap();
        assert_eq!(stats.events_received, 3);

        let received = sink.received();
        assert_eq!(received.len(), 2);
        match &received[0] {
            Event::Complex(complex) => {
                assert_eq!(complex.event_type(), "AND(A,B)");
                assert_eq!(complex.composite_id(), "a1b1");
            }
            other => panic!("expected complex event, got {:?}", other),
        }
        assert_eq!(received[1].id(), "b0");
    }

    #[derive(Debug, Clone)]
    struct FailingSink {
        fatal: bool,
    }

    impl Sink for FailingSink {
        fn send(&mut self, _event: &Event) -> NodeResult<()> {
            if self.fatal {
                Err(NodeError::forwarding_failure_msg("127.0.0.1:1", "refused"))
            } else {
                Err(NodeError::TimestampOutOfRange {
                    timestamp: 86_400_000_000,
                })
            }
        }

        fn clone_box(&self) -> Box<dyn Sink> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_fatal_sink_error_ends_run() {
        let mut node = ComputeNode::new(
            3,
            receiver(1),
            Box::new(RelayEngine),
            Box::new(FailingSink { fatal: true }),
            ShutdownHandle::detached(),
        );
        let address = node.start().unwrap();
        let mut peer = TcpStream::connect(address).unwrap();
        peer.write_all(b"simple | e1 | 00:00:01:000000 | A\n").unwrap();

        let err = node.run().unwrap_err();
        assert!(matches!(err, NodeError::ForwardingFailure { .. }));
    }

    #[test]
    fn test_non_fatal_sink_error_is_counted() {
        let mut node = ComputeNode::new(
            4,
            receiver(1),
            Box::new(RelayEngine),
            Box::new(FailingSink { fatal: false }),
            ShutdownHandle::detached(),
        );
        let address = node.start().unwrap();
        let mut peer = TcpStream::connect(address).unwrap();
        peer.write_all(b"simple | e1 | 00:00:01:000000 | A\nend-of-the-stream\n")
            .unwrap();

        let stats = node.run().unwrap();
        assert_eq!(stats.events_forwarded, 0);
        assert_eq!(stats.send_errors, 1);
    }

    #[derive(Debug, Clone)]
    struct BrokenMapper;

    impl SourceMapper for BrokenMapper {
        fn map(&self, _input: &[u8]) -> NodeResult<Vec<Event>> {
            panic!("mapper failure");
        }

        fn clone_box(&self) -> Box<dyn SourceMapper> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_receiver_failure_ends_run_with_error() {
        let receiver = TcpEventReceiver::with_mapper(
            ReceiverConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                expected_connections: 1,
                ..ReceiverConfig::default()
            },
            Box::new(BrokenMapper),
        );
        let mut node = ComputeNode::new(
            6,
            receiver,
            Box::new(RelayEngine),
            Box::new(LogSink::new()),
            ShutdownHandle::detached(),
        );
        let address = node.start().unwrap();
        let mut peer = TcpStream::connect(address).unwrap();
        peer.write_all(b"simple | e1 | 00:00:01:000000 | A\n").unwrap();

        let err = node.run().unwrap_err();
        assert!(matches!(err, NodeError::Runtime { .. }));
    }

    #[test]
    fn test_shutdown_stops_waiting_node() {
        let coordinator = ShutdownCoordinator::new();
        let node = ComputeNode::new(
            5,
            receiver(2),
            Box::new(RelayEngine),
            Box::new(LogSink::new()),
            coordinator.handle(),
        );
        coordinator.shutdown();
        let stats = node.run().unwrap();
        assert_eq!(stats, NodeStats::default());
    }

    #[test]
    fn test_from_config_without_recipients_logs() {
        let local = r#"{"forwarding": {"send_mode": "broadcast", "node_id": 9,
                        "connections_to_establish": [1]}}"#;
        let book = r#"{"9": "127.0.0.1:0"}"#;
        let config = NodeConfig::from_json(local, book).unwrap();
        let mut node = ComputeNode::from_config(
            &config,
            Some(WatermarkStrategy::WallClockCounter),
            Box::new(RelayEngine),
            ShutdownHandle::detached(),
        )
        .unwrap();
        assert!(format!("{:?}", node).contains("LogSink"));
        let address = node.start().unwrap();
        assert_eq!(node.local_addr(), Some(address));

        let complex = ComplexEvent::new(
            30,
            "SEQ(A,B)",
            vec![SimpleEvent::new("a", 10, "A", vec![]), SimpleEvent::new("b", 20, "B", vec![])],
        );
        let mut peer = TcpStream::connect(("127.0.0.1", address.port())).unwrap();
        writeln!(peer, "{}", complex.encode().unwrap()).unwrap();
        peer.write_all(b"end-of-the-stream\n").unwrap();
        assert_eq!(node.run().unwrap().events_forwarded, 1);
    }
}
