// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod line_reader;
pub mod source;
pub mod watermark;

pub use line_reader::{ByteSource, LineReader};
pub use source::{EventWithWatermark, ReceiverConfig, ReceiverState, TcpEventReceiver};
pub use watermark::{WatermarkCoordinator, WatermarkStrategy};
