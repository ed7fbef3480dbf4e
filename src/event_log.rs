//! Append-only conversation history
//!
//! Events are immutable once appended. The only mutation is flipping the
//! `discarded` flag, which hides an event from future prompts without
//! removing it from the log.

use crate::llm::{DocumentSource, ImageSource, Role};
use crate::tools::ToolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of an event within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Message body. Only text is sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Image { source: ImageSource },
    Document { name: String, source: DocumentSource },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default)]
    pub discarded: bool,
}

/// A resolved tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    /// Correlation id assigned by the model
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
    pub result: ToolResult,
    #[serde(default)]
    pub discarded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    ToolUse(ToolUseEvent),
}

impl Event {
    pub fn id(&self) -> EventId {
        match self {
            Event::Message(m) => m.id,
            Event::ToolUse(t) => t.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Message(m) => m.timestamp,
            Event::ToolUse(t) => t.timestamp,
        }
    }

    pub fn is_discarded(&self) -> bool {
        match self {
            Event::Message(m) => m.discarded,
            Event::ToolUse(t) => t.discarded,
        }
    }

    fn mark_discarded(&mut self) {
        match self {
            Event::Message(m) => m.discarded = true,
            Event::ToolUse(t) => t.discarded = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventLogError {
    #[error("event {0} is already in the log")]
    DuplicateId(EventId),
}

/// Ordered event arena with id lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Event>", into = "Vec<Event>")]
pub struct EventLog {
    events: Vec<Event>,
    index: HashMap<EventId, usize>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end of the log. Ids must be unique.
    pub fn append(&mut self, event: Event) -> Result<(), EventLogError> {
        let id = event.id();
        if self.index.contains_key(&id) {
            return Err(EventLogError::DuplicateId(id));
        }
        self.index.insert(id, self.events.len());
        self.events.push(event);
        Ok(())
    }

    /// Mark an event as discarded.
    ///
    /// Returns `false` when no event has this id. Discarding twice is fine.
    pub fn discard(&mut self, id: EventId) -> bool {
        match self.index.get(&id) {
            Some(&i) => {
                self.events[i].mark_discarded();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.index.get(&id).map(|&i| &self.events[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Events still eligible for prompting, in log order
    pub fn active(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| !e.is_discarded())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TryFrom<Vec<Event>> for EventLog {
    type Error = EventLogError;

    fn try_from(events: Vec<Event>) -> Result<Self, Self::Error> {
        let mut log = EventLog::new();
        for event in events {
            log.append(event)?;
        }
        Ok(log)
    }
}

impl From<EventLog> for Vec<Event> {
    fn from(log: EventLog) -> Self {
        log.events
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
