// src/events.rs
//! Inbound message envelope
//!
//! Every message from the game server is a JSON object of the shape
//! `{"type": ..., "eventType": ..., "data": {...}}`. It is parsed once into an
//! immutable [`Message`] and consumed exactly once by the owning manager.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::utils::errors::Result;

/// A typed, immutable notification from the game server
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Wire message kind ("event", "response", ...)
    pub message_type: String,

    /// Tag identifying the event's semantics ("phase-transition", ...)
    pub event_type: String,

    /// Unordered string-keyed payload
    pub data: Map<String, Value>,
}

impl Message {
    pub fn event(event_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            message_type: "event".into(),
            event_type: event_type.into(),
            data,
        }
    }

    /// Whether this message carries a game event
    pub fn is_event(&self) -> bool {
        self.message_type == "event"
    }
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    message_type: String,
    #[serde(rename = "eventType", default)]
    event_type: String,
    #[serde(default)]
    data: Map<String, Value>,
}

/// Parse one raw transport message into its envelope.
///
/// Missing envelope keys default to empty values; invalid JSON is an error
/// the caller logs and skips without tearing down the receive loop.
pub fn parse_message(raw: &str) -> Result<Message> {
    let wire: WireMessage = serde_json::from_str(raw)?;
    Ok(Message {
        message_type: wire.message_type,
        event_type: wire.event_type,
        data: wire.data,
    })
}
