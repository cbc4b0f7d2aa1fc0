//! Story log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Metadata attached to a story event.
pub type Metadata = Map<String, Value>;

/// Kinds of story event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PlayerAction,
    DmResponse,
    DiceRoll,
    System,
}

impl EventKind {
    /// Speaker label used when rendering context lines.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::PlayerAction => "Player",
            EventKind::DmResponse => "DM",
            EventKind::DiceRoll => "Roll",
            EventKind::System => "System",
        }
    }
}

/// One entry in the session's story log. Never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    timestamp: DateTime<Utc>,
    event_type: EventKind,
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

impl StoryEvent {
    pub fn new(kind: EventKind, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: kind,
            content: content.into(),
            metadata,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> EventKind {
        self.event_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl fmt::Display for StoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.event_type.label(), self.content)
    }
}
