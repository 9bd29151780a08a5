// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Data Mapping
//!
//! Mappers translate between raw transport bytes and [`Event`]s.
//!
//! - **SourceMapper**: raw bytes → events (inbound transport)
//! - **SinkMapper**: events → raw bytes (outbound transport)
//!
//! The node speaks a single text line protocol, implemented by
//! [`text_mapper::TextEventMapper`].

pub mod text_mapper;

pub use text_mapper::TextEventMapper;

use crate::core::error::NodeResult;
use crate::core::event::Event;
use std::fmt::Debug;

/// Trait for mapping raw bytes to events (for inbound connections)
pub trait SourceMapper: Debug + Send + Sync {
    /// Map raw input bytes to events
    ///
    /// # Returns
    /// * `Ok(Vec<Event>)` - Mapped events, possibly several for a multi-line payload
    /// * `Err(NodeError::MalformedEvent)` - The payload could not be parsed
    fn map(&self, input: &[u8]) -> NodeResult<Vec<Event>>;

    /// Clone this mapper into a boxed trait object
    fn clone_box(&self) -> Box<dyn SourceMapper>;
}

impl Clone for Box<dyn SourceMapper> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Trait for mapping events to raw bytes (for outbound connections)
pub trait SinkMapper: Debug + Send + Sync {
    /// Map events to output bytes, ready to be written to a destination
    fn map(&self, events: &[Event]) -> NodeResult<Vec<u8>>;

    /// Clone this mapper into a boxed trait object
    fn clone_box(&self) -> Box<dyn SinkMapper>;
}

impl Clone for Box<dyn SinkMapper> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
