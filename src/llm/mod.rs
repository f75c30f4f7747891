// src/llm/mod.rs
//! Language model provider boundary
//!
//! The engine only ever talks to models through [`LanguageModel`]; concrete
//! provider clients (OpenAI-compatible HTTP, local inference, ...) live in the
//! hosting application and are handed in through an explicit [`LlmRegistry`]
//! rather than any ambient global table. [`ScriptedModel`] is the built-in
//! double for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Request/response contract with a chat completion backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Explicit provider table, constructed once by the host and passed by
/// reference to whatever needs it.
#[derive(Default)]
pub struct LlmRegistry {
    providers: HashMap<String, Arc<dyn LanguageModel>>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LanguageModel>) {
        self.providers.insert(name.into(), provider);
    }

    /// Resolve a config-named provider; an unknown name is a configuration
    /// error raised at setup time.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LanguageModel>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Config(format!("unknown LLM provider '{name}'")))
    }
}

/// Canned-response model for tests and dry runs
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    fallback: Option<String>,
}

impl ScriptedModel {
    /// Replay the given responses in order; erroring once exhausted
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
        }
    }

    /// Always answer with the same response
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        let mut responses = self.responses.lock().expect("scripted model lock poisoned");
        if let Some(next) = responses.pop_front() {
            return Ok(next);
        }
        self.fallback
            .clone()
            .ok_or_else(|| EngineError::Llm("scripted responses exhausted".into()))
    }
}
