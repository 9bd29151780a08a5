// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod log_sink;
pub mod sink_trait;
pub mod tcp_sink;

pub use log_sink::LogSink;
pub use sink_trait::Sink;
pub use tcp_sink::{SendMode, SenderConfig, TcpEventSender};
