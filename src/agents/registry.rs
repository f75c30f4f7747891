// src/agents/registry.rs
//! Closed role registry
//!
//! Roles are registered once at setup from the experiment configuration and
//! resolved when the server assigns a role id. Resolution of an id outside
//! the registered set is fatal and never retried.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::role::AgentRole;
use crate::utils::errors::{EngineError, Result};

#[derive(Default)]
pub struct RoleRegistry {
    roles: HashMap<u32, Arc<dyn AgentRole>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: Arc<dyn AgentRole>) {
        self.roles.insert(role.role_id(), role);
    }

    pub fn resolve(&self, role_id: u32) -> Result<Arc<dyn AgentRole>> {
        self.roles
            .get(&role_id)
            .cloned()
            .ok_or(EngineError::UnknownRole(role_id))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
