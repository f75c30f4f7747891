// src/manager/mod.rs
//! Per-agent lifecycle management
//!
//! One manager owns one agent's whole connection to the game: its transport,
//! its [`GameState`](crate::state::GameState), and the decision capability
//! resolved when the server assigns a role. The runner only sees the
//! [`AgentManager`] trait.

pub mod phase;

use async_trait::async_trait;

use crate::utils::errors::Result;

pub use phase::{LifecycleStage, PhaseManager, PhaseManagerConfig};

/// The runner's view of one agent manager
#[async_trait]
pub trait AgentManager: Send + Sync {
    /// Connect and drive the agent until the session ends. Errors are
    /// terminal for this agent.
    async fn start(&self) -> Result<()>;

    /// Cancel any in-flight work and close the transport. Idempotent.
    async fn stop(&self);

    fn is_running(&self) -> bool;
}
