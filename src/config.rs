// src/config.rs
//! Declarative experiment configuration
//!
//! One YAML document describes an experiment end to end: the agent roles and
//! their provider bindings, the state-section field layout, the manager kind,
//! and the runner's endpoint and timing. The engine treats this schema as
//! data, building state types and mapping rules at startup. Validation
//! failures are configuration errors, raised immediately and never retried.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::state::{FieldKind, FieldSpec, SectionSchema, StateSchema};
use crate::utils::errors::{EngineError, Result};

/// Full experiment description loaded from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// The closed set of roles the server may assign
    #[serde(default)]
    pub agent_roles: Vec<RoleConfig>,

    /// Agent id to role id bindings (empty means unrestricted)
    #[serde(default)]
    pub agents: Vec<AgentBinding>,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub manager: ManagerSettings,

    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub role_id: u32,
    pub name: String,

    /// Name resolved against the host-supplied provider registry
    pub llm_provider: String,

    /// Phases this role acts in; empty means every phase
    #[serde(default)]
    pub task_phases: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AgentBinding {
    pub id: u64,
    pub role_id: u32,
}

/// Field layout of the three state sections
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub meta_fields: Vec<StateFieldConfig>,
    #[serde(default)]
    pub private_fields: Vec<StateFieldConfig>,
    #[serde(default)]
    pub public_fields: Vec<StateFieldConfig>,
}

impl StateConfig {
    pub fn build_schema(&self) -> Result<StateSchema> {
        StateSchema::new(
            section_schema(&self.meta_fields),
            section_schema(&self.private_fields),
            section_schema(&self.public_fields),
        )
    }
}

fn section_schema(fields: &[StateFieldConfig]) -> SectionSchema {
    SectionSchema::new(fields.iter().map(StateFieldConfig::to_spec).collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateFieldConfig {
    pub name: String,

    /// One of the closed registry's type names
    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub event_key: Option<String>,

    #[serde(default)]
    pub exclude_from_mapping: bool,

    #[serde(default)]
    pub events: Option<Vec<String>>,

    #[serde(default)]
    pub exclude_events: Option<Vec<String>>,
}

impl StateFieldConfig {
    fn to_spec(&self) -> FieldSpec {
        FieldSpec {
            name: self.name.clone(),
            kind: self.kind,
            default: self.default.clone(),
            event_key: self.event_key.clone(),
            exclude_from_mapping: self.exclude_from_mapping,
            events: self.events.clone(),
            exclude_events: self.exclude_events.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManagerKind {
    /// One action per phase transition, no continuous phases
    #[default]
    TurnBased,
    /// Turn-based with a configured set of continuously polled phases
    Hybrid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagerSettings {
    #[serde(default)]
    pub kind: ManagerKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub hostname: String,
    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    pub game_id: u64,

    #[serde(default = "default_phase_transition_event")]
    pub phase_transition_event: String,

    #[serde(default = "default_phase_identifier_key")]
    pub phase_identifier_key: String,

    /// Phase numbers treated as continuous (hybrid manager only)
    #[serde(default)]
    pub continuous_phases: Vec<u32>,

    /// Delay bounds between continuous actions, seconds
    #[serde(default = "default_min_action_delay")]
    pub min_action_delay: f64,
    #[serde(default = "default_max_action_delay")]
    pub max_action_delay: f64,

    /// Maximum game duration in seconds; zero or negative disables the
    /// timeout
    #[serde(default)]
    pub max_game_duration: f64,
}

fn default_protocol() -> String {
    "ws".into()
}

fn default_path() -> String {
    "wss".into()
}

fn default_phase_transition_event() -> String {
    "phase-transition".into()
}

fn default_phase_identifier_key() -> String {
    "phase".into()
}

fn default_min_action_delay() -> f64 {
    5.0
}

fn default_max_action_delay() -> f64 {
    10.0
}

impl RunnerSettings {
    pub fn ws_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol, self.hostname, self.port, self.path
        )
    }
}

impl ExperimentConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        if self.runner.min_action_delay > self.runner.max_action_delay {
            return Err(EngineError::Config(format!(
                "min_action_delay ({}) exceeds max_action_delay ({})",
                self.runner.min_action_delay, self.runner.max_action_delay
            )));
        }
        if self.manager.kind == ManagerKind::TurnBased && !self.runner.continuous_phases.is_empty()
        {
            return Err(EngineError::Config(
                "turn-based manager cannot declare continuous phases".into(),
            ));
        }
        for (idx, role) in self.agent_roles.iter().enumerate() {
            if self.agent_roles[..idx]
                .iter()
                .any(|r| r.role_id == role.role_id)
            {
                return Err(EngineError::Config(format!(
                    "duplicate role id {}",
                    role.role_id
                )));
            }
        }
        for binding in &self.agents {
            if !self
                .agent_roles
                .iter()
                .any(|role| role.role_id == binding.role_id)
            {
                return Err(EngineError::Config(format!(
                    "agent {} bound to undeclared role {}",
                    binding.id, binding.role_id
                )));
            }
        }
        Ok(())
    }
}
