// src/agents/role.rs
//! Role implementations
//!
//! [`LlmRole`] is the standard role: gate on the configured task phases,
//! render prompts from the state snapshot, ask the model, parse the reply as
//! a JSON action payload. Prompt text generation sits behind [`PromptSource`]
//! so hosts can plug in their own template machinery.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::llm::{ChatMessage, LanguageModel};
use crate::state::GameState;
use crate::utils::errors::{EngineError, Result};

/// Decision capability bound to one role id
#[async_trait]
pub trait AgentRole: Send + Sync {
    fn role_id(&self) -> u32;

    fn name(&self) -> &str;

    /// Produce an action payload for the phase, or `None` to stay silent.
    async fn decide(&self, phase: u32, state: &GameState) -> Result<Option<Value>>;
}

/// Prompt text for one phase, rendered from the state snapshot
pub trait PromptSource: Send + Sync {
    fn system_prompt(&self, role_name: &str, phase: u32, snapshot: &Value) -> String;

    fn user_prompt(&self, role_name: &str, phase: u32, snapshot: &Value) -> String;
}

/// Minimal prompt source: a fixed system preamble plus the serialized state.
///
/// Real experiments plug in their own template rendering through
/// [`PromptSource`].
#[derive(Debug, Clone, Default)]
pub struct StaticPrompts {
    pub preamble: String,
}

impl StaticPrompts {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }
}

impl PromptSource for StaticPrompts {
    fn system_prompt(&self, role_name: &str, phase: u32, _snapshot: &Value) -> String {
        format!(
            "{}You are playing the role '{}' in phase {} of an economic game. \
             Respond with a single JSON action payload, or null for no action.",
            self.preamble, role_name, phase
        )
    }

    fn user_prompt(&self, _role_name: &str, phase: u32, snapshot: &Value) -> String {
        format!("Current phase: {phase}\nGame state:\n{snapshot}")
    }
}

/// LLM-backed role
pub struct LlmRole {
    role_id: u32,
    name: String,
    /// Phases this role acts in; empty means every phase
    task_phases: Vec<u32>,
    model: Arc<dyn LanguageModel>,
    prompts: Arc<dyn PromptSource>,
}

impl LlmRole {
    pub fn new(
        role_id: u32,
        name: impl Into<String>,
        task_phases: Vec<u32>,
        model: Arc<dyn LanguageModel>,
        prompts: Arc<dyn PromptSource>,
    ) -> Self {
        Self {
            role_id,
            name: name.into(),
            task_phases,
            model,
            prompts,
        }
    }

    fn acts_in(&self, phase: u32) -> bool {
        self.task_phases.is_empty() || self.task_phases.contains(&phase)
    }

    fn parse_response(&self, raw: &str) -> Result<Option<Value>> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| EngineError::Llm(format!("unparseable action payload: {e}")))?;
        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }
}

#[async_trait]
impl AgentRole for LlmRole {
    fn role_id(&self) -> u32 {
        self.role_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(&self, phase: u32, state: &GameState) -> Result<Option<Value>> {
        if !self.acts_in(phase) {
            debug!(role = %self.name, phase, "phase outside task set, no action");
            return Ok(None);
        }

        let snapshot = state.snapshot();
        let messages = [
            ChatMessage::system(self.prompts.system_prompt(&self.name, phase, &snapshot)),
            ChatMessage::user(self.prompts.user_prompt(&self.name, phase, &snapshot)),
        ];
        let raw = self.model.complete(&messages).await?;
        self.parse_response(&raw)
    }
}
