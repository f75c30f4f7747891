// src/experiment.rs
//! Experiment assembly
//!
//! Turns a validated [`ExperimentConfig`] plus per-agent login payloads into
//! live machinery: one state, transport, and manager per agent, a shared
//! role registry, and the runner supervising them. Language model providers
//! come from the host through an explicit [`LlmRegistry`].

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::agents::{LlmRole, RoleRegistry, StaticPrompts};
use crate::config::{ExperimentConfig, ManagerKind};
use crate::llm::LlmRegistry;
use crate::manager::{AgentManager, PhaseManager, PhaseManagerConfig};
use crate::runner::{GameRunner, GameRunnerConfig};
use crate::state::GameState;
use crate::transport::{LoginPayloadAuth, WebSocketTransport};
use crate::utils::errors::{EngineError, Result};

/// Instantiate the closed role set from the configuration
pub fn build_role_registry(
    config: &ExperimentConfig,
    llms: &LlmRegistry,
) -> Result<Arc<RoleRegistry>> {
    let mut registry = RoleRegistry::new();
    for role in &config.agent_roles {
        let model = llms.resolve(&role.llm_provider)?;
        registry.register(Arc::new(LlmRole::new(
            role.role_id,
            role.name.clone(),
            role.task_phases.clone(),
            model,
            Arc::new(StaticPrompts::default()),
        )));
    }
    Ok(Arc::new(registry))
}

/// Build the runner with one manager per login payload.
///
/// Each payload authenticates one agent's connection and must carry an
/// `agent_id` matching the configured bindings.
pub fn build_runner(
    config: &ExperimentConfig,
    login_payloads: &[Value],
    llms: &LlmRegistry,
) -> Result<GameRunner> {
    let schema = config.state.build_schema()?;
    let roles = build_role_registry(config, llms)?;
    let url = config.runner.ws_url();
    let game_id = config.runner.game_id;

    let continuous_phases: HashSet<u32> = match config.manager.kind {
        ManagerKind::TurnBased => HashSet::new(),
        ManagerKind::Hybrid => config.runner.continuous_phases.iter().copied().collect(),
    };

    let mut managers: Vec<Arc<dyn AgentManager>> = Vec::with_capacity(login_payloads.len());
    for payload in login_payloads {
        let agent_id = payload
            .get("agent_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                EngineError::Config(format!("login payload missing 'agent_id': {payload}"))
            })?;
        if !config.agents.is_empty() && !config.agents.iter().any(|b| b.id == agent_id) {
            return Err(EngineError::Config(format!(
                "no role binding for agent {agent_id}"
            )));
        }

        let mut state = GameState::new(&schema)?;
        state
            .sections_mut()
            .meta
            .set("game_id", serde_json::json!(game_id))?;

        let manager_config = PhaseManagerConfig {
            game_id,
            agent_id: Some(agent_id),
            phase_transition_event: config.runner.phase_transition_event.clone(),
            phase_identifier_key: config.runner.phase_identifier_key.clone(),
            continuous_phases: continuous_phases.clone(),
            min_action_delay: config.runner.min_action_delay,
            max_action_delay: config.runner.max_action_delay,
            ..Default::default()
        };
        let transport = Arc::new(WebSocketTransport::new(
            url.clone(),
            Arc::new(LoginPayloadAuth::new(payload.clone())),
        ));
        managers.push(Arc::new(PhaseManager::new(
            manager_config,
            transport,
            Arc::clone(&roles),
            Some(state),
        )));
    }

    info!(game = game_id, agents = managers.len(), "experiment assembled");
    Ok(GameRunner::new(
        GameRunnerConfig::new(game_id, config.runner.max_game_duration),
        managers,
    ))
}
