//! TASQ - Trading Agent Signal Quorum.
//!
//! Fans a subject out to a panel of trading-analysis agents, each running
//! as a Claude CLI subprocess, and folds their verdicts into a single
//! [`TradeSignal`](tasq_models::TradeSignal). Every run is tracked as an
//! observable task whose event stream can be subscribed to at any point.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tasq::models::TasqConfig;
//! use tasq::engine::Orchestrator;
//! use tasq::agents::{AnalysisAgent, CliAgent};
//! ```

pub use tasq_agents as agents;
pub use tasq_engine as engine;
pub use tasq_models as models;

use std::sync::Arc;

use tasq_agents::{prompts, AnalysisAgent, CliAgent, CliSynthesizer, Synthesizer};
use tasq_engine::Orchestrator;
use tasq_models::{AnalysisTask, TasqConfig};

/// Build an [`Orchestrator`] from configuration.
///
/// Disabled specialists are skipped. Every enabled specialist must name a
/// domain the prompt registry knows; an unknown domain fails the build
/// rather than erroring on first use.
pub fn build_orchestrator(config: &TasqConfig) -> Result<Orchestrator, anyhow::Error> {
    let mut agents: Vec<Arc<dyn AnalysisAgent>> = Vec::new();
    for spec in config.agents.specialists.iter().filter(|spec| spec.enabled) {
        if prompts::agent_prompt(&spec.domain).is_none() {
            anyhow::bail!(
                "agent '{}' has unknown domain '{}'; no system prompt registered",
                spec.name,
                spec.domain
            );
        }
        agents.push(Arc::new(CliAgent::from_spec(spec, &config.agents)) as Arc<dyn AnalysisAgent>);
    }

    if agents.is_empty() {
        anyhow::bail!("no enabled agents in configuration");
    }

    let synthesizer: Option<Arc<dyn Synthesizer>> = config.aggregation.synthesizer.enabled.then(|| {
        Arc::new(CliSynthesizer::from_config(&config.aggregation.synthesizer))
            as Arc<dyn Synthesizer>
    });

    Ok(Orchestrator::new(agents, synthesizer, config))
}

/// Run one analysis to completion and return the final task snapshot.
///
/// Convenience wrapper for callers that do not care about intermediate
/// events. Joining an already-running task for the same subject waits for
/// that task instead of starting a new one.
pub async fn analyze(
    orchestrator: &Orchestrator,
    subject: &str,
    market_context: serde_json::Value,
) -> Result<AnalysisTask, tasq_engine::EngineError> {
    let creation = orchestrator.run_analysis(subject, market_context).await?;
    let task_id = creation.task_id();

    let mut stream = orchestrator.subscribe(task_id).await?;
    while stream.next().await.is_some() {}

    orchestrator.get_task(task_id).await
}
