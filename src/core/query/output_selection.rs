// SPDX-License-Identifier: MIT OR Apache-2.0

//! Projection of a pattern match onto the event types a query outputs.

use crate::core::error::NodeResult;
use crate::core::event::timestamp::now_micros_of_day;
use crate::core::event::{primitive_types, ComplexEvent, Event, SimpleEvent, Timestamp};
use std::collections::HashSet;
use uuid::Uuid;

const RELABEL_ID_LENGTH: usize = 8;

/// Builds the result event of a query from the events of a match.
///
/// Constituents whose type is not selected are dropped, duplicates (by id) are kept
/// once in match order. When the query outputs fewer types than it matches, the
/// kept events are new facts and receive fresh ids.
#[derive(Debug, Clone)]
pub struct OutputSelection {
    query_name: String,
    selected_types: HashSet<String>,
    query_length: usize,
}

impl OutputSelection {
    pub fn new<I, S>(query_name: impl Into<String>, selected_types: I, query_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query_name: query_name.into(),
            selected_types: selected_types.into_iter().map(Into::into).collect(),
            query_length,
        }
    }

    /// Selection for an operator term such as `SEQ(A,B,C)`, whose length is the
    /// number of distinct primitive types in the term
    pub fn for_query<I, S>(query: &str, selected_types: I) -> NodeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let query_length = primitive_types(query)?.len();
        Ok(Self::new(query, selected_types, query_length))
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    /// Whether selected events are given fresh ids
    pub fn relabels(&self) -> bool {
        self.selected_types.len() < self.query_length
    }

    /// Build the result event, stamped with the current time of day
    pub fn select<'a>(&self, matched: impl IntoIterator<Item = &'a Event>) -> ComplexEvent {
        self.select_at(matched, now_micros_of_day())
    }

    pub fn select_at<'a>(
        &self,
        matched: impl IntoIterator<Item = &'a Event>,
        creation_timestamp: Timestamp,
    ) -> ComplexEvent {
        let mut seen = HashSet::new();
        let mut selected: Vec<SimpleEvent> = Vec::new();
        for event in matched {
            for contained in event.contained_simple_events() {
                if self.selected_types.contains(contained.event_type())
                    && seen.insert(contained.id().to_string())
                {
                    selected.push(contained.clone());
                }
            }
        }

        if self.relabels() {
            selected = selected
                .iter()
                .map(|e| e.relabeled(fresh_id()))
                .collect();
        }

        ComplexEvent::new(creation_timestamp, self.query_name.clone(), selected)
    }
}

fn fresh_id() -> String {
    Uuid::new_v4()
        .to_string()
        .chars()
        .take(RELABEL_ID_LENGTH)
        .collect()
}
