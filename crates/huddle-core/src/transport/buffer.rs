//! Append-only buffer of inbound events.

use std::cmp::Ordering;

use crate::message::{compare_ids, ChatMessage, InboundEvent};

/// Inbound events in arrival order plus the highest message id seen so far.
///
/// Anything at or below the high-water mark is treated as a duplicate, which
/// makes repeated polling of the same window idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBuffer {
    events: Vec<InboundEvent>,
    last_seen: Option<String>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` unless its id is at or below the high-water mark.
    ///
    /// Returns `true` if the event was appended.
    pub fn push(&mut self, event: InboundEvent) -> bool {
        if !self.is_new(event.id()) {
            return false;
        }
        self.last_seen = Some(event.id().to_string());
        self.events.push(event);
        true
    }

    /// Merges a polling batch, keeping the batch order.
    ///
    /// Returns the events that were actually appended.
    pub fn merge_polled(&mut self, messages: Vec<ChatMessage>) -> Vec<InboundEvent> {
        let mut appended = Vec::new();
        for message in messages {
            let event = InboundEvent::from_message(message);
            if self.push(event.clone()) {
                appended.push(event);
            }
        }
        appended
    }

    pub fn events(&self) -> &[InboundEvent] {
        &self.events
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn is_new(&self, id: &str) -> bool {
        match &self.last_seen {
            Some(seen) => compare_ids(id, seen) == Ordering::Greater,
            None => true,
        }
    }
}
