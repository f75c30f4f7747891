// src/lib.rs
//! Econ Lab Engine
//!
//! Runtime for LLM-backed agents playing multi-agent economic game
//! experiments against a remote game server.
//!
//! # Architecture
//!
//! - **transport**: persistent WebSocket channel with pluggable
//!   authentication and automatic reconnection
//! - **events**: the typed envelope every inbound message is parsed into
//! - **state**: the three-section game state, its declarative field-to-event
//!   mapping engine, and the order-book mirror
//! - **agents** / **llm**: decision capabilities behind the language model
//!   provider boundary
//! - **manager**: the per-agent phase state machine, discrete and continuous
//! - **runner**: supervision of all agents for one game, with the global
//!   timeout watchdog
//! - **config** / **experiment**: declarative YAML experiment description and
//!   its assembly into live machinery
//!
//! Everything multiplexes on one cooperative event loop: one task per agent
//! manager, one per continuous-phase loop, one timeout watchdog. Each game
//! state is owned by exactly one manager task, so the update path needs no
//! locks.

pub mod agents;
pub mod config;
pub mod events;
pub mod experiment;
pub mod llm;
pub mod manager;
pub mod runner;
pub mod state;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::ExperimentConfig;
pub use events::Message;
pub use manager::{AgentManager, PhaseManager, PhaseManagerConfig};
pub use runner::{GameRunner, GameRunnerConfig};
pub use state::{GameState, MarketState, StateSchema};
pub use utils::errors::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
