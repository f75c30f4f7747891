// src/manager/phase.rs
//! Phase-driven agent state machine
//!
//! Lifecycle: `Unauthenticated → AwaitingRole → Ready → InPhase(n) → Stopped`.
//!
//! The manager runs as a single actor task multiplexing three signals: the
//! ordered inbound message channel, ticks from the continuous-phase loop, and
//! its cancellation token. Every event first updates the attached state, then
//! drives the lifecycle:
//!
//! - identity assignment records the player name and immediately acknowledges
//!   readiness to the server
//! - role assignment resolves the decision capability from the closed role
//!   registry (an unknown id is fatal)
//! - a phase transition either asks the agent once (discrete phase) or starts
//!   a randomized polling loop (continuous phase) that is cancelled
//!   cooperatively when a later transition leaves the phase
//!
//! Ticks are messages into the owning task rather than shared-state polling,
//! so the game state stays exclusively owned and lock-free on the update path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::{AgentRole, RoleRegistry};
use crate::events::{parse_message, Message};
use crate::manager::AgentManager;
use crate::state::GameState;
use crate::transport::MessageTransport;
use crate::utils::errors::{EngineError, Result};

use async_trait::async_trait;

/// Override for one phase's action; receives the phase and a state snapshot
pub type PhaseHandler = Box<dyn Fn(u32, &Value) -> Result<Option<Value>> + Send + Sync>;

/// Host-registered handler for one event type; a returned payload is sent
pub type EventCallback = Box<dyn Fn(&Message) -> Result<Option<Value>> + Send + Sync>;

/// Hook invoked at phase boundaries
pub type PhaseHook = Box<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Unauthenticated,
    AwaitingRole,
    Ready,
    InPhase(u32),
    Stopped,
}

/// Knobs for one manager, straight from the experiment configuration
#[derive(Debug, Clone)]
pub struct PhaseManagerConfig {
    pub game_id: u64,

    /// Included in the readiness acknowledgement when present
    pub agent_id: Option<u64>,

    pub phase_transition_event: String,
    pub phase_identifier_key: String,
    pub name_assignment_event: String,
    pub role_assignment_event: String,
    pub role_identifier_key: String,

    /// Phases polled on a timer instead of once per transition
    pub continuous_phases: HashSet<u32>,

    /// Bounds of the randomized delay between continuous actions, seconds
    pub min_action_delay: f64,
    pub max_action_delay: f64,
}

impl Default for PhaseManagerConfig {
    fn default() -> Self {
        Self {
            game_id: 0,
            agent_id: None,
            phase_transition_event: "phase-transition".into(),
            phase_identifier_key: "phase".into(),
            name_assignment_event: "assign-name".into(),
            role_assignment_event: "assign-role".into(),
            role_identifier_key: "role".into(),
            continuous_phases: HashSet::new(),
            min_action_delay: 10.0,
            max_action_delay: 20.0,
        }
    }
}

struct ContinuousLoop {
    phase: u32,
    token: CancellationToken,
}

struct ManagerCore {
    state: Option<GameState>,
    agent: Option<Arc<dyn AgentRole>>,
    stage: LifecycleStage,
    current_phase: Option<u32>,
    player_name: Option<String>,
    continuous: Option<ContinuousLoop>,
}

/// Per-agent state machine coordinating transport, state, and decisions
pub struct PhaseManager {
    config: PhaseManagerConfig,
    transport: Arc<dyn MessageTransport>,
    roles: Arc<RoleRegistry>,
    core: Mutex<ManagerCore>,
    cancel: CancellationToken,
    running: AtomicBool,
    phase_handlers: HashMap<u32, PhaseHandler>,
    event_callbacks: HashMap<String, Vec<EventCallback>>,
    phase_start_hook: Option<PhaseHook>,
    phase_end_hook: Option<PhaseHook>,
}

impl PhaseManager {
    pub fn new(
        config: PhaseManagerConfig,
        transport: Arc<dyn MessageTransport>,
        roles: Arc<RoleRegistry>,
        state: Option<GameState>,
    ) -> Self {
        Self {
            config,
            transport,
            roles,
            core: Mutex::new(ManagerCore {
                state,
                agent: None,
                stage: LifecycleStage::Unauthenticated,
                current_phase: None,
                player_name: None,
                continuous: None,
            }),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            phase_handlers: HashMap::new(),
            event_callbacks: HashMap::new(),
            phase_start_hook: None,
            phase_end_hook: None,
        }
    }

    /// Replace the agent consultation for one phase. Registration happens at
    /// setup, before the manager starts.
    pub fn register_phase_handler(&mut self, phase: u32, handler: PhaseHandler) {
        self.phase_handlers.insert(phase, handler);
    }

    /// Register a handler for an event type; any payload it returns is sent
    /// to the server after the state update.
    pub fn register_event_callback(&mut self, event_type: impl Into<String>, callback: EventCallback) {
        self.event_callbacks
            .entry(event_type.into())
            .or_default()
            .push(callback);
    }

    pub fn on_phase_start(&mut self, hook: PhaseHook) {
        self.phase_start_hook = Some(hook);
    }

    pub fn on_phase_end(&mut self, hook: PhaseHook) {
        self.phase_end_hook = Some(hook);
    }

    pub async fn stage(&self) -> LifecycleStage {
        self.core.lock().await.stage
    }

    pub async fn current_phase(&self) -> Option<u32> {
        self.core.lock().await.current_phase
    }

    pub async fn player_name(&self) -> Option<String> {
        self.core.lock().await.player_name.clone()
    }

    pub async fn role_name(&self) -> Option<String> {
        let core = self.core.lock().await;
        core.agent.as_ref().map(|a| a.name().to_string())
    }

    async fn run(&self) -> Result<()> {
        let mut inbound = self.transport.open().await?;
        {
            let mut core = self.core.lock().await;
            core.stage = LifecycleStage::AwaitingRole;
        }
        info!(game = self.config.game_id, "connected, awaiting identity");

        let (tick_tx, mut tick_rx) = mpsc::channel::<u32>(8);
        let outcome = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("manager cancelled");
                    break Ok(());
                }
                message = inbound.recv() => match message {
                    Some(raw) => {
                        if let Err(e) = self.handle_raw(&raw, &tick_tx).await {
                            break Err(e);
                        }
                    }
                    None => {
                        info!("message stream ended");
                        break Ok(());
                    }
                },
                Some(phase) = tick_rx.recv() => self.handle_tick(phase).await,
            }
        };
        self.shutdown().await;
        outcome
    }

    async fn handle_raw(&self, raw: &str, tick_tx: &mpsc::Sender<u32>) -> Result<()> {
        let message = match parse_message(raw) {
            Ok(message) => message,
            Err(e) => {
                error!("invalid JSON received: {e}");
                return Ok(());
            }
        };
        if !message.is_event() {
            debug!(kind = %message.message_type, "ignoring non-event message");
            return Ok(());
        }
        self.handle_event(&message, tick_tx).await
    }

    async fn handle_event(&self, message: &Message, tick_tx: &mpsc::Sender<u32>) -> Result<()> {
        let mut core = self.core.lock().await;

        if let Some(state) = core.state.as_mut() {
            state.update(message)?;
        }

        if let Some(callbacks) = self.event_callbacks.get(&message.event_type) {
            for callback in callbacks {
                if let Some(payload) = callback(message)? {
                    self.transport.send(&payload.to_string()).await?;
                }
            }
        }

        if message.event_type == self.config.name_assignment_event {
            self.handle_name_assignment(&mut core, message).await?;
        } else if message.event_type == self.config.role_assignment_event {
            self.handle_role_assignment(&mut core, message)?;
        } else if message.event_type == self.config.phase_transition_event {
            let phase = message
                .data
                .get(&self.config.phase_identifier_key)
                .and_then(Value::as_u64)
                .map(|p| p as u32);
            self.transition(&mut core, phase, tick_tx).await?;
        }
        Ok(())
    }

    async fn handle_name_assignment(
        &self,
        core: &mut ManagerCore,
        message: &Message,
    ) -> Result<()> {
        core.player_name = message
            .data
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!(
            game = self.config.game_id,
            name = core.player_name.as_deref().unwrap_or_default(),
            "identity assigned"
        );

        let mut ack = json!({"gameId": self.config.game_id, "type": "player-is-ready"});
        if let Some(agent_id) = self.config.agent_id {
            ack["agentId"] = json!(agent_id);
        }
        self.transport.send(&ack.to_string()).await?;
        info!("sent player-is-ready");
        Ok(())
    }

    fn handle_role_assignment(&self, core: &mut ManagerCore, message: &Message) -> Result<()> {
        let role_id = message
            .data
            .get(&self.config.role_identifier_key)
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        // Role ids are a closed, config-declared set; an unknown id is a
        // fatal configuration error, not retried.
        let role = self.roles.resolve(role_id)?;
        info!(role = role_id, name = role.name(), "role assigned");
        core.agent = Some(role);
        core.stage = LifecycleStage::Ready;
        Ok(())
    }

    async fn transition(
        &self,
        core: &mut ManagerCore,
        new_phase: Option<u32>,
        tick_tx: &mpsc::Sender<u32>,
    ) -> Result<()> {
        info!(phase = ?new_phase, "phase transition");

        if let Some(continuous) = core.continuous.take() {
            if new_phase == Some(continuous.phase) {
                // Same continuous phase re-announced; the loop keeps running
                core.continuous = Some(continuous);
                return Ok(());
            }
            info!(phase = continuous.phase, "stopping continuous phase");
            continuous.token.cancel();
        }

        if let Some(old_phase) = core.current_phase {
            if let Some(hook) = &self.phase_end_hook {
                hook(old_phase);
            }
        }

        core.current_phase = new_phase;
        let Some(phase) = new_phase else {
            warn!("phase transition without a phase id");
            core.stage = LifecycleStage::Ready;
            return Ok(());
        };
        core.stage = LifecycleStage::InPhase(phase);

        if let Some(hook) = &self.phase_start_hook {
            hook(phase);
        }

        if self.config.continuous_phases.contains(&phase) {
            let token = self.cancel.child_token();
            self.spawn_tick_loop(phase, token.clone(), tick_tx.clone());
            core.continuous = Some(ContinuousLoop { phase, token });
        }

        // Initial action for continuous phases, the single action otherwise
        self.execute_phase_action(core, phase).await
    }

    fn spawn_tick_loop(&self, phase: u32, token: CancellationToken, tick_tx: mpsc::Sender<u32>) {
        let (min, max) = (self.config.min_action_delay, self.config.max_action_delay);
        tokio::spawn(async move {
            loop {
                let delay = rand::thread_rng().gen_range(min..=max);
                debug!(phase, delay, "waiting before next continuous action");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
                }
                if tick_tx.send(phase).await.is_err() {
                    break;
                }
            }
            debug!(phase, "continuous phase loop cancelled");
        });
    }

    async fn handle_tick(&self, phase: u32) {
        let mut core = self.core.lock().await;
        let still_active = core.current_phase == Some(phase)
            && matches!(&core.continuous, Some(c) if c.phase == phase);
        if !still_active {
            return;
        }

        // A failing loop iteration ends the loop, not the whole agent
        if let Err(e) = self.execute_phase_action(&mut core, phase).await {
            error!(phase, "continuous phase action failed: {e}");
            if let Some(continuous) = core.continuous.take() {
                continuous.token.cancel();
            }
        }
    }

    async fn execute_phase_action(&self, core: &mut ManagerCore, phase: u32) -> Result<()> {
        let payload = if let Some(handler) = self.phase_handlers.get(&phase) {
            let snapshot = core
                .state
                .as_ref()
                .map(GameState::snapshot)
                .unwrap_or(Value::Null);
            handler(phase, &snapshot)?
        } else if let Some(agent) = core.agent.clone() {
            match core.state.as_ref() {
                Some(state) => agent.decide(phase, state).await?,
                None => {
                    warn!(phase, "no state attached, skipping action");
                    None
                }
            }
        } else {
            warn!(phase, "no agent resolved, cannot act");
            None
        };

        if let Some(payload) = payload {
            if !payload.is_null() {
                self.transport.send(&payload.to_string()).await?;
                if core.continuous.is_some() {
                    debug!(phase, "sent continuous action");
                } else {
                    info!(phase, "sent action");
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        if let Some(continuous) = core.continuous.take() {
            continuous.token.cancel();
        }
        core.stage = LifecycleStage::Stopped;
        drop(core);
        self.transport.stop().await;
    }
}

#[async_trait]
impl AgentManager for PhaseManager {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Transport("manager already running".into()));
        }
        let outcome = self.run().await;
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.shutdown().await;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SectionSchema, StateSchema};
    use crate::transport::testing::ChannelTransport;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Role that replays scripted decisions
    struct ScriptedRole {
        id: u32,
        name: String,
        decisions: StdMutex<VecDeque<Result<Option<Value>>>>,
        fallback: Option<Value>,
    }

    impl ScriptedRole {
        fn always(id: u32, payload: Value) -> Self {
            Self {
                id,
                name: format!("role-{id}"),
                decisions: StdMutex::new(VecDeque::new()),
                fallback: Some(payload),
            }
        }

        fn silent(id: u32) -> Self {
            Self {
                id,
                name: format!("role-{id}"),
                decisions: StdMutex::new(VecDeque::new()),
                fallback: None,
            }
        }

        fn scripted(id: u32, decisions: Vec<Result<Option<Value>>>) -> Self {
            Self {
                id,
                name: format!("role-{id}"),
                decisions: StdMutex::new(decisions.into()),
                fallback: None,
            }
        }
    }

    #[async_trait]
    impl AgentRole for ScriptedRole {
        fn role_id(&self) -> u32 {
            self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        async fn decide(&self, _phase: u32, _state: &GameState) -> Result<Option<Value>> {
            if let Some(next) = self.decisions.lock().unwrap().pop_front() {
                return next;
            }
            Ok(self.fallback.clone())
        }
    }

    fn empty_state() -> GameState {
        let schema = StateSchema::new(
            SectionSchema::default(),
            SectionSchema::default(),
            SectionSchema::default(),
        )
        .unwrap();
        GameState::new(&schema).unwrap()
    }

    fn registry(roles: Vec<Arc<dyn AgentRole>>) -> Arc<RoleRegistry> {
        let mut registry = RoleRegistry::new();
        for role in roles {
            registry.register(role);
        }
        Arc::new(registry)
    }

    fn fast_config(continuous: &[u32]) -> PhaseManagerConfig {
        PhaseManagerConfig {
            game_id: 42,
            agent_id: Some(7),
            continuous_phases: continuous.iter().copied().collect(),
            min_action_delay: 0.01,
            max_action_delay: 0.02,
            ..Default::default()
        }
    }

    fn spawn_manager(
        manager: Arc<PhaseManager>,
    ) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { manager.start().await })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn event(event_type: &str, data: Value) -> String {
        json!({"type": "event", "eventType": event_type, "data": data}).to_string()
    }

    #[tokio::test]
    async fn test_identity_assignment_sends_ready_ack() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![Arc::new(ScriptedRole::silent(1))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-name", json!({"name": "Hawk", "number": 2})))
            .await
            .unwrap();
        settle().await;

        let sent = transport.sent_json();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            json!({"gameId": 42, "type": "player-is-ready", "agentId": 7})
        );
        assert_eq!(manager.player_name().await.as_deref(), Some("Hawk"));
        assert_eq!(manager.stage().await, LifecycleStage::AwaitingRole);

        manager.stop().await;
        handle.await.unwrap().unwrap();
        assert!(transport.is_stopped());
    }

    #[tokio::test]
    async fn test_role_assignment_resolves_decision_maker() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![
            Arc::new(ScriptedRole::silent(1)),
            Arc::new(ScriptedRole::silent(2)),
            Arc::new(ScriptedRole::silent(3)),
        ]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 2})))
            .await
            .unwrap();
        settle().await;

        assert_eq!(manager.role_name().await.as_deref(), Some("role-2"));
        assert_eq!(manager.stage().await, LifecycleStage::Ready);

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unrecognized_role_is_fatal() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![
            Arc::new(ScriptedRole::silent(1)),
            Arc::new(ScriptedRole::silent(2)),
            Arc::new(ScriptedRole::silent(3)),
        ]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 99})))
            .await
            .unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(EngineError::UnknownRole(99))));
        assert!(transport.is_stopped());
    }

    #[tokio::test]
    async fn test_discrete_phase_asks_agent_once() {
        let (transport, server) = ChannelTransport::new();
        let action = json!({"type": "declare", "value": 100});
        let roles = registry(vec![Arc::new(ScriptedRole::always(1, action.clone()))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 1})))
            .await
            .unwrap();
        server
            .send(event("phase-transition", json!({"phase": 2})))
            .await
            .unwrap();
        settle().await;

        assert_eq!(transport.sent_json(), vec![action]);
        assert_eq!(manager.stage().await, LifecycleStage::InPhase(2));
        assert_eq!(manager.current_phase().await, Some(2));

        // No further actions without another transition
        settle().await;
        assert_eq!(transport.sent().len(), 1);

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_discrete_phase_failure_propagates() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![Arc::new(ScriptedRole::scripted(
            1,
            vec![Err(EngineError::Llm("provider unavailable".into()))],
        ))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 1})))
            .await
            .unwrap();
        server
            .send(event("phase-transition", json!({"phase": 2})))
            .await
            .unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(EngineError::Llm(_))));
    }

    #[tokio::test]
    async fn test_continuous_phase_polls_until_left() {
        let (transport, server) = ChannelTransport::new();
        let action = json!({"type": "post-order", "price": 10});
        let roles = registry(vec![Arc::new(ScriptedRole::always(1, action))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[6]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 1})))
            .await
            .unwrap();
        server
            .send(event("phase-transition", json!({"phase": 6})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Initial action plus several polled ones
        let polled = transport.sent().len();
        assert!(polled >= 3, "expected repeated polling, got {polled}");

        // Leaving the phase cancels the loop; only the phase-7 action lands
        server
            .send(event("phase-transition", json!({"phase": 7})))
            .await
            .unwrap();
        settle().await;
        let after_leave = transport.sent().len();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.sent().len(), after_leave);

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_continuous_tick_failure_ends_loop_quietly() {
        let (transport, server) = ChannelTransport::new();
        let action = json!({"type": "post-order"});
        let roles = registry(vec![Arc::new(ScriptedRole::scripted(
            1,
            vec![
                Ok(Some(action)),
                Err(EngineError::Llm("provider unavailable".into())),
            ],
        ))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[6]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 1})))
            .await
            .unwrap();
        server
            .send(event("phase-transition", json!({"phase": 6})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Initial action landed, the failing tick ended the loop, and the
        // manager itself keeps running
        assert_eq!(transport.sent().len(), 1);
        assert!(manager.is_running());

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_phase_handler_override_takes_precedence() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![Arc::new(ScriptedRole::always(
            1,
            json!({"from": "agent"}),
        ))]);
        let mut manager = PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        );
        manager.register_phase_handler(
            3,
            Box::new(|phase: u32, _snapshot: &Value| {
                Ok(Some(json!({"from": "handler", "phase": phase})))
            }),
        );
        let manager = Arc::new(manager);
        let handle = spawn_manager(manager.clone());

        server
            .send(event("assign-role", json!({"role": 1})))
            .await
            .unwrap();
        server
            .send(event("phase-transition", json!({"phase": 3})))
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            transport.sent_json(),
            vec![json!({"from": "handler", "phase": 3})]
        );

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_event_callback_payload_is_sent() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![Arc::new(ScriptedRole::silent(1))]);
        let mut manager = PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        );
        manager.register_event_callback(
            "round-started",
            Box::new(|message: &Message| {
                let round = message.data.get("round").cloned().unwrap_or(Value::Null);
                Ok(Some(json!({"type": "round-ack", "round": round})))
            }),
        );
        let manager = Arc::new(manager);
        let handle = spawn_manager(manager.clone());

        server
            .send(event("round-started", json!({"round": 4})))
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            transport.sent_json(),
            vec![json!({"type": "round-ack", "round": 4})]
        );

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_state_is_updated_before_dispatch() {
        let (transport, server) = ChannelTransport::new();
        let roles = registry(vec![Arc::new(ScriptedRole::silent(1))]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            Some(empty_state()),
        ));
        let handle = spawn_manager(manager.clone());

        server
            .send(event("phase-transition", json!({"phase": 5})))
            .await
            .unwrap();
        settle().await;

        // The baseline phase mapping saw the event before phase dispatch
        assert_eq!(manager.current_phase().await, Some(5));

        manager.stop().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (transport, _server) = ChannelTransport::new();
        let roles = registry(vec![]);
        let manager = Arc::new(PhaseManager::new(
            fast_config(&[]),
            transport.clone(),
            roles,
            None,
        ));

        manager.stop().await;
        manager.stop().await;
        assert_eq!(manager.stage().await, LifecycleStage::Stopped);
        assert!(transport.is_stopped());
    }
}
