// SPDX-License-Identifier: MIT OR Apache-2.0

use cep_node::core::stream::input::source::{ReceiverConfig, TcpEventReceiver};
use cep_node::core::stream::output::sink::LogSink;
use cep_node::core::util::{ShutdownCoordinator, ShutdownHandle};
use cep_node::{ComplexEvent, ComputeNode, Event, NodeConfig, NodeError, RelayEngine, SimpleEvent};
use std::io::Write;
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;

fn write_configs(dir: &tempfile::TempDir, local: &str, book: &str) -> (PathBuf, PathBuf) {
    let local_path = dir.path().join("config.json");
    let book_path = dir.path().join("address_book.json");
    std::fs::write(&local_path, local).unwrap();
    std::fs::write(&book_path, book).unwrap();
    (local_path, book_path)
}

fn sink_node(id: u32, sink: &LogSink) -> ComputeNode {
    let receiver = TcpEventReceiver::new(ReceiverConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        expected_connections: 1,
        ..ReceiverConfig::default()
    });
    ComputeNode::new(
        id,
        receiver,
        Box::new(RelayEngine),
        Box::new(sink.clone()),
        ShutdownHandle::detached(),
    )
}

#[test]
fn two_node_chain_delivers_and_terminates() {
    let collected = LogSink::new();
    let mut last = sink_node(2, &collected);
    let last_address = last.start().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let local = r#"{
        "forwarding": {
            "send_mode": "broadcast",
            "recipient": [2],
            "node_id": 1,
            "connections_to_establish": [0]
        }
    }"#;
    let book = format!(
        r#"{{"1": "127.0.0.1:0", "2": "127.0.0.1:{}"}}"#,
        last_address.port()
    );
    let (local_path, book_path) = write_configs(&dir, local, &book);

    let config = NodeConfig::load(&local_path, &book_path).unwrap();
    let mut first = ComputeNode::from_config(
        &config,
        None,
        Box::new(RelayEngine),
        ShutdownHandle::detached(),
    )
    .unwrap();
    let first_address = first.start().unwrap();

    let last_run = thread::spawn(move || last.run());
    let first_run = thread::spawn(move || first.run());

    let complex = ComplexEvent::new(
        5_000,
        "SEQ(A,B)",
        vec![
            SimpleEvent::new("a1", 1_000, "A", vec!["x".to_string()]),
            SimpleEvent::new("b1", 2_000, "B", vec![]),
        ],
    );
    let events = vec![
        Event::Simple(SimpleEvent::new("a1", 1_000, "A", vec!["x".to_string()])),
        Event::Complex(complex),
        Event::Simple(SimpleEvent::new("c1", 6_000, "C", vec![])),
    ];

    let mut source = TcpStream::connect(("127.0.0.1", first_address.port())).unwrap();
    for event in &events {
        writeln!(source, "{}", event.encode().unwrap()).unwrap();
    }
    source.write_all(b"end-of-the-stream\n").unwrap();

    let first_stats = first_run.join().unwrap().unwrap();
    assert_eq!(first_stats.events_forwarded, 3);
    let last_stats = last_run.join().unwrap().unwrap();
    assert_eq!(last_stats.events_received, 3);
    assert_eq!(collected.received(), events);
}

#[test]
fn missing_successor_fails_the_node() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let local = r#"{"forwarding": {"send_mode": "round_robin", "recipient": [5],
                    "node_id": 4, "connections_to_establish": [3]}}"#;
    let book = format!(r#"{{"4": "127.0.0.1:0", "5": "127.0.0.1:{}"}}"#, closed_port);
    let config = NodeConfig::from_json(local, &book).unwrap();

    let mut node = ComputeNode::from_config(
        &config,
        None,
        Box::new(RelayEngine),
        ShutdownHandle::detached(),
    )
    .unwrap();
    let address = node.start().unwrap();

    let mut source = TcpStream::connect(("127.0.0.1", address.port())).unwrap();
    source
        .write_all(b"simple | e1 | 00:00:00:000001 | A\n")
        .unwrap();

    let err = node.run().unwrap_err();
    assert!(matches!(err, NodeError::ForwardingFailure { .. }));
}

#[test]
fn shutdown_interrupts_a_waiting_node() {
    let coordinator = ShutdownCoordinator::new();
    let receiver = TcpEventReceiver::new(ReceiverConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        expected_connections: 1,
        ..ReceiverConfig::default()
    });
    let node = ComputeNode::new(
        7,
        receiver,
        Box::new(RelayEngine),
        Box::new(LogSink::new()),
        coordinator.handle(),
    );

    let run = thread::spawn(move || node.run());
    thread::sleep(std::time::Duration::from_millis(200));
    coordinator.shutdown();

    let stats = run.join().unwrap().unwrap();
    assert_eq!(stats.events_received, 0);
}

#[test]
fn missing_config_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = NodeConfig::load(dir.path().join("absent.json"), dir.path().join("book.json"))
        .unwrap_err();
    assert!(matches!(err, NodeError::Configuration { .. }));
}
