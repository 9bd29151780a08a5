// SPDX-License-Identifier: MIT OR Apache-2.0

use cep_node::core::stream::input::source::{ReceiverConfig, ReceiverState, TcpEventReceiver};
use cep_node::core::stream::output::sink::{SendMode, SenderConfig, Sink, TcpEventSender};
use cep_node::{Event, NodeError, SimpleEvent, TcpAddress, Timestamp};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn receiver(connections: usize) -> (TcpEventReceiver, SocketAddr) {
    let mut receiver = TcpEventReceiver::new(ReceiverConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        expected_connections: connections,
        ..ReceiverConfig::default()
    });
    let address = receiver.start().unwrap();
    (receiver, address)
}

fn simple(id: &str, ts: Timestamp, ty: &str) -> Event {
    Event::Simple(SimpleEvent::new(id, ts, ty, vec![format!("{}-value", id)]))
}

fn next_id(receiver: &TcpEventReceiver) -> String {
    receiver
        .dequeue_timeout(WAIT)
        .map(|item| item.event.id().to_string())
        .expect("event expected")
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn listener() -> (TcpListener, TcpAddress) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, TcpAddress::new("127.0.0.1", port))
}

/// Accept the sender's connection and read until it closes
fn drain(listener: &TcpListener) -> String {
    let (mut stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut received = String::new();
    stream.read_to_string(&mut received).unwrap();
    received
}

#[test]
fn receiver_queues_events_with_watermarks() {
    let (receiver, address) = receiver(1);
    let mut peer = TcpStream::connect(address).unwrap();
    peer.write_all(b"simple | e1 | 00:00:00:000100 | A | 1\nsimple | e2 | 00:00:00:000200 | B | 2\n")
        .unwrap();

    let first = receiver.dequeue_timeout(WAIT).unwrap();
    assert_eq!(first.event.id(), "e1");
    assert_eq!(first.watermark, 99);
    let second = receiver.dequeue_timeout(WAIT).unwrap();
    assert_eq!(second.event.id(), "e2");
    assert_eq!(second.watermark, 199);
    assert_eq!(receiver.state(), ReceiverState::Running);

    peer.write_all(b"end-of-the-stream\n").unwrap();
    assert!(receiver.dequeue().is_none());
    assert_eq!(receiver.state(), ReceiverState::Finished);
    assert_eq!(receiver.watermark(), Timestamp::MAX);
    assert!(receiver.is_exhausted());
}

#[test]
fn partial_line_does_not_block_other_connections() {
    let (receiver, address) = receiver(2);
    let mut slow = TcpStream::connect(address).unwrap();
    let mut fast = TcpStream::connect(address).unwrap();

    slow.write_all(b"simple | s1 | 00:00:00:000050 | A\nsimple | s2 | 00:00:0")
        .unwrap();
    fast.write_all(b"simple | f1 | 00:00:00:000010 | B\n").unwrap();

    let mut ids = vec![next_id(&receiver), next_id(&receiver)];
    ids.sort();
    assert_eq!(ids, vec!["f1", "s1"]);
    assert!(receiver.dequeue_timeout(Duration::from_millis(100)).is_none());

    slow.write_all(b"0:000060 | A\n").unwrap();
    let completed = receiver.dequeue_timeout(WAIT).unwrap();
    assert_eq!(completed.event.id(), "s2");
    assert_eq!(completed.event.timestamp(), 60);
    // the fast connection still holds the minimum
    assert_eq!(completed.watermark, 9);

    fast.write_all(b"end-of-the-stream\n").unwrap();
    wait_until(|| receiver.watermark() == 59);
    slow.write_all(b"end-of-the-stream\n").unwrap();
    assert!(receiver.dequeue().is_none());
    assert_eq!(receiver.state(), ReceiverState::Finished);
}

#[test]
fn lines_after_end_of_stream_are_discarded() {
    let (receiver, address) = receiver(1);
    let mut peer = TcpStream::connect(address).unwrap();
    peer.write_all(
        b"simple | e1 | 00:00:01:000000 | A\nend-of-the-stream\nsimple | e2 | 00:00:02:000000 | A\n",
    )
    .unwrap();

    assert_eq!(next_id(&receiver), "e1");
    assert!(receiver.dequeue().is_none());
    assert_eq!(receiver.state(), ReceiverState::Finished);
}

#[test]
fn malformed_lines_are_skipped() {
    let (receiver, address) = receiver(1);
    let mut peer = TcpStream::connect(address).unwrap();
    peer.write_all(b"hello without separators\n").unwrap();
    peer.write_all(b"simple | bad | xx:00:00:000000 | A\n").unwrap();
    peer.write_all(b"bogus | x | y\n").unwrap();
    peer.write_all(b"simple | ok | 00:00:00:000001 | A\nend-of-the-stream\n")
        .unwrap();

    assert_eq!(next_id(&receiver), "ok");
    assert!(receiver.dequeue().is_none());
}

#[test]
fn out_of_range_timestamp_keeps_connection_open() {
    let (receiver, address) = receiver(1);
    let mut peer = TcpStream::connect(address).unwrap();
    peer.write_all(b"simple | huge | 9999999999:00:00:000000 | A\n").unwrap();
    peer.write_all(b"simple | ok | 00:00:00:000001 | A\nend-of-the-stream\n")
        .unwrap();

    assert_eq!(next_id(&receiver), "ok");
    assert!(receiver.dequeue().is_none());
    assert_eq!(receiver.state(), ReceiverState::Finished);
}

#[test]
fn connection_closed_without_marker_counts_as_finished() {
    let (receiver, address) = receiver(1);
    {
        let mut peer = TcpStream::connect(address).unwrap();
        peer.write_all(b"simple | e1 | 00:00:00:000300 | A\n").unwrap();
    }

    assert_eq!(next_id(&receiver), "e1");
    assert!(receiver.dequeue().is_none());
    assert_eq!(receiver.state(), ReceiverState::Finished);
    assert_eq!(receiver.watermark(), Timestamp::MAX);
}

#[test]
fn cancel_while_accepting() {
    let (mut receiver, _address) = receiver(3);
    receiver.cancel();
    receiver.join().unwrap();
    assert_eq!(receiver.state(), ReceiverState::Cancelled);
    assert!(receiver.dequeue().is_none());
}

#[test]
fn bind_failure_is_reported() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut receiver = TcpEventReceiver::new(ReceiverConfig {
        host: "127.0.0.1".to_string(),
        port,
        expected_connections: 1,
        ..ReceiverConfig::default()
    });
    let err = receiver.start().unwrap_err();
    assert!(matches!(err, NodeError::BindFailure { .. }));
    assert!(err.is_fatal());
}

#[test]
fn round_robin_rotates_over_destinations() {
    let (x, x_address) = listener();
    let (y, y_address) = listener();
    let (z, z_address) = listener();

    let mut sender = TcpEventSender::new(SenderConfig {
        mode: SendMode::RoundRobin,
        destinations: vec![x_address, y_address, z_address],
        ..SenderConfig::default()
    });
    for (i, id) in ["e1", "e2", "e3", "e4"].iter().enumerate() {
        sender.send(&simple(id, i as Timestamp + 1, "A")).unwrap();
    }
    assert_eq!(sender.connection_count(), 3);
    sender.stop();

    let x_lines = drain(&x);
    let y_lines = drain(&y);
    let z_lines = drain(&z);
    let ids = |text: &str| -> Vec<String> {
        text.lines()
            .map(|line| Event::parse(line).unwrap().id().to_string())
            .collect()
    };
    assert_eq!(ids(&x_lines), vec!["e1", "e4"]);
    assert_eq!(ids(&y_lines), vec!["e2"]);
    assert_eq!(ids(&z_lines), vec!["e3"]);
}

#[test]
fn broadcast_sends_identical_bytes() {
    let (a, a_address) = listener();
    let (b, b_address) = listener();

    let mut sender = TcpEventSender::new(SenderConfig {
        mode: SendMode::Broadcast,
        destinations: vec![a_address, b_address],
        ..SenderConfig::default()
    });
    sender.send(&simple("e1", 1_000, "A")).unwrap();
    sender.send(&simple("e2", 2_000, "B")).unwrap();
    sender.finish().unwrap();
    sender.stop();

    let to_a = drain(&a);
    let to_b = drain(&b);
    assert_eq!(to_a, to_b);
    assert_eq!(
        to_a,
        "simple | e1 | 00:00:00:001000 | A | e1-value\n\
         simple | e2 | 00:00:00:002000 | B | e2-value\n\
         end-of-the-stream\n"
    );
}

#[test]
fn unreachable_destination_is_forwarding_failure() {
    let (closed, address) = listener();
    drop(closed);

    let mut sender = TcpEventSender::new(SenderConfig {
        destinations: vec![address],
        connect_timeout_ms: 1_000,
        ..SenderConfig::default()
    });
    let err = sender.send(&simple("e1", 1, "A")).unwrap_err();
    assert!(matches!(err, NodeError::ForwardingFailure { .. }));
    assert!(err.is_fatal());
    assert_eq!(sender.connection_count(), 0);
}

#[test]
fn sender_feeds_receiver() {
    let (receiver, address) = receiver(1);
    let mut sender = TcpEventSender::new(SenderConfig {
        destinations: vec![TcpAddress::new("127.0.0.1", address.port())],
        ..SenderConfig::default()
    });
    sender.validate_connectivity().unwrap();

    let events: Vec<Event> = (1..=50)
        .map(|i| simple(&format!("e{}", i), i * 10, "A"))
        .collect();
    sender.send_all(&events).unwrap();
    sender.finish().unwrap();

    let mut received = Vec::new();
    while let Some(item) = receiver.dequeue() {
        received.push(item.event);
    }
    assert_eq!(received, events);
    assert_eq!(receiver.state(), ReceiverState::Finished);
    sender.stop();
}
