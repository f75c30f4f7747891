// src/runner.rs
//! Top-level game supervision
//!
//! The runner starts every agent manager as an independent task and runs
//! until either all agents finish naturally or the configured maximum game
//! duration elapses, whichever comes first. On timeout it forcibly stops
//! every still-running manager. One agent's failure is logged with its index
//! and never aborts its siblings, and the timeout watchdog is cancelled in a
//! guaranteed cleanup step on every exit path.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::manager::AgentManager;
use crate::utils::errors::Result;

/// Runner settings
#[derive(Debug, Clone)]
pub struct GameRunnerConfig {
    pub game_id: u64,

    /// Maximum game duration in seconds; zero or negative disables the
    /// timeout entirely
    pub max_game_duration: f64,
}

impl GameRunnerConfig {
    pub fn new(game_id: u64, max_game_duration: f64) -> Self {
        Self {
            game_id,
            max_game_duration,
        }
    }
}

struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Supervisor for all agent managers of one game instance
pub struct GameRunner {
    config: GameRunnerConfig,
    agents: Vec<Arc<dyn AgentManager>>,
}

impl GameRunner {
    pub fn new(config: GameRunnerConfig, agents: Vec<Arc<dyn AgentManager>>) -> Self {
        Self { config, agents }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Run the game to completion or to the configured deadline.
    ///
    /// Timeout is a first-class terminal condition, not an error: the runner
    /// still returns `Ok(())` after forcing the agents down.
    pub async fn run_game(&self) -> Result<()> {
        let game_id = self.config.game_id;
        info!(game = game_id, agents = self.agents.len(), "starting game");

        let mut handles = Vec::with_capacity(self.agents.len());
        for (idx, agent) in self.agents.iter().enumerate() {
            let agent = Arc::clone(agent);
            let task_id = idx + 1;
            handles.push(tokio::spawn(async move {
                if let Err(e) = agent.start().await {
                    // Partial-failure tolerance: log with the agent's index,
                    // leave the siblings running
                    error!(
                        game = game_id,
                        agent = task_id,
                        "agent task {game_id}-{task_id} failed with: {e}"
                    );
                }
            }));
        }
        let mut game = join_all(handles);

        let max_duration = self.config.max_game_duration;
        if max_duration > 0.0 {
            let mut watchdog =
                tokio::spawn(tokio::time::sleep(Duration::from_secs_f64(max_duration)));
            // Guaranteed cleanup: the watchdog dies on every exit path,
            // including this future being cancelled from outside
            let _watchdog_cleanup = AbortOnDrop(watchdog.abort_handle());

            let timed_out = tokio::select! {
                _ = &mut game => {
                    info!(
                        game = game_id,
                        "game finished or errored before timeout, cancelling timeout watchdog"
                    );
                    false
                }
                _ = &mut watchdog => true,
            };

            if timed_out {
                warn!(
                    game = game_id,
                    "game {game_id} reached maximum duration ({max_duration}s)"
                );
                for (idx, agent) in self.agents.iter().enumerate() {
                    info!(game = game_id, "timeout: stopping agent {}", idx + 1);
                    agent.stop().await;
                }
                // Let the agent tasks unwind after the forced stop
                let _ = game.await;
            }
        } else {
            let _ = game.await;
        }

        info!(game = game_id, "game finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::EngineError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Manager double that simulates work for a fixed duration
    struct MockManager {
        hang: Duration,
        fail_on_start: bool,
        started: AtomicBool,
        stopped: AtomicBool,
        running: AtomicBool,
        cancel: CancellationToken,
    }

    impl MockManager {
        fn hanging(hang: Duration) -> Arc<Self> {
            Arc::new(Self {
                hang,
                fail_on_start: false,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                hang: Duration::ZERO,
                fail_on_start: true,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            })
        }

        fn was_started(&self) -> bool {
            self.started.load(Ordering::SeqCst)
        }

        fn was_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentManager for MockManager {
        async fn start(&self) -> crate::utils::errors::Result<()> {
            self.started.store(true, Ordering::SeqCst);
            if self.fail_on_start {
                return Err(EngineError::Transport("simulated start failure".into()));
            }
            self.running.store(true, Ordering::SeqCst);
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.hang) => {}
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.cancel.cancel();
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn as_agents(managers: &[Arc<MockManager>]) -> Vec<Arc<dyn AgentManager>> {
        managers
            .iter()
            .map(|m| Arc::clone(m) as Arc<dyn AgentManager>)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forcibly_stops_hanging_agents() {
        let agents = [
            MockManager::hanging(Duration::from_secs(5)),
            MockManager::hanging(Duration::from_secs(5)),
        ];
        let runner = GameRunner::new(GameRunnerConfig::new(1, 0.1), as_agents(&agents));

        runner.run_game().await.unwrap();

        for agent in &agents {
            assert!(agent.was_started());
            assert!(agent.was_stopped(), "agent not stopped on timeout");
            assert!(!agent.is_running());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_finishing_early_cancels_watchdog() {
        let agents = [
            MockManager::hanging(Duration::from_millis(100)),
            MockManager::hanging(Duration::from_millis(100)),
        ];
        let runner = GameRunner::new(GameRunnerConfig::new(1, 5.0), as_agents(&agents));

        runner.run_game().await.unwrap();

        for agent in &agents {
            assert!(agent.was_started());
            assert!(!agent.was_stopped(), "no forced stop before the deadline");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_disables_timeout() {
        let agents = [MockManager::hanging(Duration::from_millis(100))];
        let runner = GameRunner::new(GameRunnerConfig::new(1, 0.0), as_agents(&agents));

        runner.run_game().await.unwrap();

        assert!(agents[0].was_started());
        assert!(!agents[0].was_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_duration_disables_timeout() {
        let agents = [MockManager::hanging(Duration::from_millis(100))];
        let runner = GameRunner::new(GameRunnerConfig::new(1, -100.0), as_agents(&agents));

        runner.run_game().await.unwrap();

        assert!(agents[0].was_started());
        assert!(!agents[0].was_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_agent_does_not_abort_siblings() {
        let failing = MockManager::failing();
        let healthy = MockManager::hanging(Duration::from_millis(100));
        let runner = GameRunner::new(
            GameRunnerConfig::new(1, 10.0),
            vec![
                Arc::clone(&failing) as Arc<dyn AgentManager>,
                Arc::clone(&healthy) as Arc<dyn AgentManager>,
            ],
        );

        runner.run_game().await.unwrap();

        assert!(failing.was_started());
        assert!(healthy.was_started());
        assert!(!healthy.was_stopped(), "healthy agent ran to completion");
    }
}
