// src/agents/mod.rs
//! Agent decision capabilities
//!
//! An [`AgentRole`] turns the current game state into an action payload for
//! one phase. Roles form a closed, config-declared set held by a
//! [`RoleRegistry`]; the manager resolves the concrete role when the server
//! assigns it, and an id outside the set is a fatal configuration error.

pub mod registry;
pub mod role;

pub use registry::RoleRegistry;
pub use role::{AgentRole, LlmRole, PromptSource, StaticPrompts};
