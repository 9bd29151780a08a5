// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::NodeResult;
use crate::core::event::Event;
use std::fmt::Debug;

/// Destination for the node's result events.
///
/// Sinks are driven synchronously by the node runtime. An `Err` from
/// [`send`](Sink::send) that [`is_fatal`](crate::core::error::NodeError::is_fatal)
/// ends the node.
pub trait Sink: Debug + Send {
    fn start(&mut self) -> NodeResult<()> {
        Ok(())
    }

    /// Serialize and deliver one event
    fn send(&mut self, event: &Event) -> NodeResult<()>;

    fn send_all(&mut self, events: &[Event]) -> NodeResult<()> {
        for event in events {
            self.send(event)?;
        }
        Ok(())
    }

    /// Signal downstream that no further events will follow
    fn finish(&mut self) -> NodeResult<()> {
        Ok(())
    }

    /// Flush and release connections
    fn stop(&mut self) {}

    fn clone_box(&self) -> Box<dyn Sink>;

    /// Verify that every destination is reachable before events start flowing.
    ///
    /// Returns Ok by default. Sinks with remote destinations override this so the
    /// node fails at startup instead of on its first match.
    fn validate_connectivity(&mut self) -> NodeResult<()> {
        Ok(())
    }
}

impl Clone for Box<dyn Sink> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
