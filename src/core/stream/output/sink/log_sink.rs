// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{NodeError, NodeResult};
use crate::core::event::Event;
use crate::core::stream::output::sink::sink_trait::Sink;
use std::sync::{Arc, Mutex};

/// LogSink - logs every result event in wire format and keeps a copy.
///
/// Used by nodes without successors (the last node of a pipeline prints its
/// matches) and by tests that need to inspect what a node produced.
#[derive(Debug, Clone)]
pub struct LogSink {
    pub events: Arc<Mutex<Vec<Event>>>,
    prefix: String,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_prefix("[LOG]")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            prefix: prefix.into(),
        }
    }

    /// Snapshot of the events received so far
    pub fn received(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Sink for LogSink {
    fn send(&mut self, event: &Event) -> NodeResult<()> {
        match event.encode() {
            Ok(line) => log::info!("{} {}", self.prefix, line),
            // timestamps past midnight have no wire form
            Err(e) => log::info!("{} {:?} ({})", self.prefix, event, e),
        }
        self.events
            .lock()
            .map_err(|_| NodeError::runtime("LogSink event buffer poisoned"))?
            .push(event.clone());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Sink> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::SimpleEvent;

    #[test]
    fn test_log_sink_collects_events() {
        let mut sink = LogSink::with_prefix("[node-3]");
        let handle = sink.clone();
        let a = Event::from(SimpleEvent::new("a1", 1, "A", vec![]));
        let late = Event::from(SimpleEvent::new("late", 86_400_000_001, "A", vec![]));
        sink.send_all(&[a.clone(), late.clone()]).unwrap();

        // clones share the buffer
        assert_eq!(handle.received(), vec![a, late]);
    }
}
