use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Spans `start` to `end`.
    #[default]
    Event,
    /// A single moment; any `end` is ignored for display.
    Point,
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(EventKind::Event),
            "point" => Ok(EventKind::Point),
            other => Err(anyhow::anyhow!("invalid event type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub start: Instant,

    #[serde(default)]
    pub end: Option<Instant>,

    #[serde(rename = "type", default)]
    pub kind: EventKind,

    pub club: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Last time the event was created or changed through the CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<Instant>,
}

impl EventRecord {
    pub fn new(club: String, name: String, start: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end: None,
            kind: EventKind::Point,
            club,
            name,
            description: String::new(),
            edited: None,
        }
    }

    /// End instant, falling back to `start` when absent.
    pub fn end_or_start(&self) -> Instant {
        self.end.unwrap_or(self.start)
    }

    pub fn is_ranged(&self) -> bool {
        self.kind == EventKind::Event && self.end_or_start() != self.start
    }
}
