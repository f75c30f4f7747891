// src/main.rs
//! Econ Lab Engine experiment launcher
//!
//! Loads an experiment description and a login payload file, assembles the
//! agents, and runs the game. Only the scripted (no-op) language model is
//! registered here; hosting applications embed the library and register real
//! provider clients through [`econlab_engine::llm::LlmRegistry`].

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use econlab_engine::experiment;
use econlab_engine::llm::{LlmRegistry, ScriptedModel};
use econlab_engine::ExperimentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Econ Lab Engine v{}", econlab_engine::VERSION);

    let mut args = std::env::args().skip(1);
    let usage = "usage: econlab-engine <experiment.yaml> <logins.json>";
    let config_path = args.next().context(usage)?;
    let logins_path = args.next().context(usage)?;

    let config = ExperimentConfig::from_yaml_file(&config_path)
        .with_context(|| format!("failed to load experiment from {config_path}"))?;
    info!(experiment = %config.name, game = config.runner.game_id, "experiment loaded");

    let login_payloads: Vec<Value> = serde_json::from_str(
        &fs::read_to_string(&logins_path)
            .with_context(|| format!("failed to read login payloads from {logins_path}"))?,
    )?;

    // Dry-run provider set; real deployments register their own clients
    let mut llms = LlmRegistry::new();
    llms.register("scripted", Arc::new(ScriptedModel::repeating("null")));

    let runner = experiment::build_runner(&config, &login_payloads, &llms)?;
    runner.run_game().await?;

    info!("game finished");
    Ok(())
}
