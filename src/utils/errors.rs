// src/utils/errors.rs
//! Engine error taxonomy
//!
//! Errors fall into the layers of the system they originate from:
//!
//! - **Configuration**: contradictory or unresolvable setup (unknown role id,
//!   bad field type, conflicting mapping filters). Fatal, raised at setup
//!   time, never retried.
//! - **Transport**: connect refused, authentication rejected. The connection
//!   simply does not become ready; the caller decides whether to retry.
//! - **State update**: a custom handler failed on malformed event data.
//!   Wrapped with the failing event type and re-raised, never dropped.
//! - **Provider**: the language model backend failed to produce a usable
//!   response.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or contradictory configuration; never retried
    #[error("configuration error: {0}")]
    Config(String),

    /// A role id outside the config-declared set
    #[error("unknown role id: {0}")]
    UnknownRole(u32),

    /// Connection could not be established or was lost beyond recovery
    #[error("transport error: {0}")]
    Transport(String),

    /// The authentication strategy declined the connection
    #[error("authentication rejected")]
    AuthRejected,

    /// A custom state handler failed while interpreting an event
    #[error("state update failed for event '{event_type}': {source}")]
    StateUpdate {
        event_type: String,
        #[source]
        source: Box<EngineError>,
    },

    /// A key a custom handler requires was absent from the event data
    #[error("event data missing required key '{key}'")]
    MissingEventKey { key: String },

    /// A mapped value did not match the field's declared kind
    #[error("field '{field}' expects a {expected} value")]
    TypeMismatch { field: String, expected: &'static str },

    /// The language model provider failed
    #[error("language model error: {0}")]
    Llm(String),

    /// Malformed JSON payload
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed YAML configuration
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem error while loading configuration
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Wrap a handler failure with the event type that triggered it
    pub fn during_update(event_type: &str, source: EngineError) -> Self {
        EngineError::StateUpdate {
            event_type: event_type.to_string(),
            source: Box::new(source),
        }
    }
}
