// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod input;
pub mod mapper;
pub mod output;

pub use self::input::{
    EventWithWatermark, LineReader, ReceiverConfig, ReceiverState, TcpEventReceiver,
    WatermarkCoordinator, WatermarkStrategy,
};
pub use self::mapper::{SinkMapper, SourceMapper, TextEventMapper};
pub use self::output::{LogSink, SendMode, SenderConfig, Sink, TcpEventSender};
