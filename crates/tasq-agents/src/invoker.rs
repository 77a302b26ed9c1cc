use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use tasq_models::{AgentRequest, AgentVerdict};

use crate::agent::AnalysisAgent;

/// Reasoning longer than this is cut before it enters task snapshots.
pub const MAX_REASONING_CHARS: usize = 480;

/// Run one agent against a request, normalizing every failure mode into a
/// verdict.
///
/// Never errors: a timeout, an `Err` from the agent, and a panic inside the
/// agent future all come back as `is_error` verdicts, so one bad agent can
/// only cost its own vote.
pub async fn invoke(
    agent: Arc<dyn AnalysisAgent>,
    request: AgentRequest,
    timeout: Duration,
) -> AgentVerdict {
    let agent_id = agent.id().to_string();
    let started = Instant::now();

    let mut call = tokio::spawn(async move { agent.analyze(&request).await });

    let mut verdict = match tokio::time::timeout(timeout, &mut call).await {
        Ok(Ok(Ok(verdict))) => verdict,
        Ok(Ok(Err(e))) => {
            warn!(agent = %agent_id, error = %e, "Agent invocation failed");
            AgentVerdict::error(&agent_id, e.to_string())
        }
        Ok(Err(e)) => {
            error!(agent = %agent_id, error = %e, "Agent task panicked");
            AgentVerdict::error(&agent_id, format!("agent panicked: {e}"))
        }
        Err(_) => {
            call.abort();
            warn!(agent = %agent_id, timeout_s = timeout.as_secs(), "Agent timed out");
            AgentVerdict::error(
                &agent_id,
                format!("timed out after {} seconds", timeout.as_secs()),
            )
        }
    };

    if verdict.reasoning.chars().count() > MAX_REASONING_CHARS {
        verdict.reasoning = verdict.reasoning.chars().take(MAX_REASONING_CHARS).collect();
    }
    verdict.elapsed_ms = started.elapsed().as_millis() as u64;
    verdict
}
