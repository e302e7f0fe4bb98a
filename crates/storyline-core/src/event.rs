//! Story events and the bounded queue feeding the engine.

use heapless::Deque;
use serde::Serialize;

use crate::scenario::{StoryText, TextTooLong, story_text};

pub const EVENT_QUEUE_CAPACITY: usize = 12;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryEventType {
    #[default]
    None,
    Unlock,
    AudioDone,
    Timer,
    Serial,
    Action,
    Button,
    EspNow,
}

impl StoryEventType {
    pub const ALL: [Self; 8] = [
        Self::None,
        Self::Unlock,
        Self::AudioDone,
        Self::Timer,
        Self::Serial,
        Self::Action,
        Self::Button,
        Self::EspNow,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unlock => "unlock",
            Self::AudioDone => "audio_done",
            Self::Timer => "timer",
            Self::Serial => "serial",
            Self::Action => "action",
            Self::Button => "button",
            Self::EspNow => "espnow",
        }
    }

    /// Case-insensitive lookup; `None` for unknown names.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }

    /// Scenario files map unknown event types to [`StoryEventType::None`],
    /// which the validator then rejects on event triggers.
    pub fn from_schema(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::None)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StoryEvent {
    #[serde(rename = "type")]
    pub event_type: StoryEventType,
    pub name: StoryText,
    pub value: i32,
    pub at_ms: u32,
}

impl StoryEvent {
    pub fn new(
        event_type: StoryEventType,
        name: &str,
        value: i32,
        at_ms: u32,
    ) -> Result<Self, TextTooLong> {
        Ok(Self {
            event_type,
            name: story_text(name)?,
            value,
            at_ms,
        })
    }

    /// Same `(type, name, value)` signature, timestamps ignored.
    pub fn same_payload(&self, other: &Self) -> bool {
        self.event_type == other.event_type && self.name == other.name && self.value == other.value
    }
}

/// Fixed-capacity FIFO. Pushing into a full queue drops the event and bumps
/// the lifetime drop counter.
#[derive(Clone, Debug)]
pub struct StoryEventQueue {
    items: Deque<StoryEvent, EVENT_QUEUE_CAPACITY>,
    dropped: u32,
}

impl Default for StoryEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryEventQueue {
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
            dropped: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        EVENT_QUEUE_CAPACITY
    }

    pub fn push(&mut self, event: StoryEvent) -> bool {
        match self.items.push_back(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.saturating_add(1);
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<StoryEvent> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    /// Drop queued events; the lifetime drop counter is kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[cfg(test)]
mod tests;
