// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod tcp_source;

pub use tcp_source::{ReceiverConfig, ReceiverState, TcpEventReceiver};

use crate::core::event::{Event, Timestamp};

/// An inbound event together with the receiver's watermark at the time it was queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWithWatermark {
    pub event: Event,
    pub watermark: Timestamp,
}

impl EventWithWatermark {
    pub fn new(event: Event, watermark: Timestamp) -> Self {
        Self { event, watermark }
    }
}
