//! Event: an immutable record of something that happened.
//!
//! Events are produced by event sources (the clock, a debug poke, a
//! platform integration) and by built-in actions that ask the platform to
//! do something (`intent.*`). Rules match on the event kind and fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::property::Value;
use crate::time::{Timestamp, now};

/// Kind of the events published by the built-in clock.
pub const TIME_TICK: &str = "time.tick";

/// Kind of the events published by the debug poke source.
pub const DEBUG_POKE: &str = "debug.poke";

/// Prefix of the events that ask the platform to perform a side effect.
pub const INTENT_PREFIX: &str = "intent.";

/// A record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Dotted event kind, e.g. `time.tick`.
    pub kind: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            kind: kind.into(),
            fields: BTreeMap::new(),
            timestamp: now(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a field; `None` when the event does not carry it.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether this event asks the platform layer to do something.
    #[must_use]
    pub fn is_intent(&self) -> bool {
        self.kind.starts_with(INTENT_PREFIX)
    }
}
