// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod sink;

pub use sink::{LogSink, SendMode, SenderConfig, Sink, TcpEventSender};
