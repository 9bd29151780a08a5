// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line protocol mapper.
//!
//! Source side: every non-empty `\n`-separated line of the payload is parsed as one
//! event. Sink side: one line per event, each terminated by `\n`.

use super::{SinkMapper, SourceMapper};
use crate::core::error::NodeResult;
use crate::core::event::Event;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextEventMapper;

impl TextEventMapper {
    pub fn new() -> Self {
        Self
    }

    /// Encode a single event as one delimited line
    pub fn encode_line(event: &Event) -> NodeResult<String> {
        let mut line = event.encode()?;
        line.push('\n');
        Ok(line)
    }
}

impl SourceMapper for TextEventMapper {
    fn map(&self, input: &[u8]) -> NodeResult<Vec<Event>> {
        String::from_utf8_lossy(input)
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(Event::parse)
            .collect()
    }

    fn clone_box(&self) -> Box<dyn SourceMapper> {
        Box::new(*self)
    }
}

impl SinkMapper for TextEventMapper {
    fn map(&self, events: &[Event]) -> NodeResult<Vec<u8>> {
        let mut out = Vec::new();
        for event in events {
            out.extend_from_slice(Self::encode_line(event)?.as_bytes());
        }
        Ok(out)
    }

    fn clone_box(&self) -> Box<dyn SinkMapper> {
        Box::new(*self)
    }
}
