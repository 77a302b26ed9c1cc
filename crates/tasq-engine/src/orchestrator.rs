use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tasq_agents::{invoke, AnalysisAgent, Synthesizer};
use tasq_models::{AgentRequest, AgentVerdict, AnalysisTask, TaskError, TasqConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::error::EngineError;
use crate::events::EventStream;
use crate::store::{TaskCreation, TaskStore};

/// Top-level coordinator: accepts analysis requests, fans agents out, and
/// settles tasks through the store.
///
/// Cheap to clone; all clones share the same store and cancellation map.
#[derive(Clone)]
pub struct Orchestrator {
    agents: Vec<Arc<dyn AnalysisAgent>>,
    aggregator: Arc<Aggregator>,
    store: Arc<TaskStore>,
    timeouts: Arc<HashMap<String, Duration>>,
    default_timeout: Duration,
    max_concurrent: Option<usize>,
    cancellations: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.agents.len())
            .field("default_timeout", &self.default_timeout)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        agents: Vec<Arc<dyn AnalysisAgent>>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
        config: &TasqConfig,
    ) -> Self {
        let timeouts: HashMap<String, Duration> = config
            .agents
            .specialists
            .iter()
            .filter_map(|spec| {
                spec.timeout_seconds
                    .map(|secs| (spec.name.clone(), Duration::from_secs(secs)))
            })
            .collect();

        Self {
            agents,
            aggregator: Arc::new(Aggregator::from_config(synthesizer, config)),
            store: Arc::new(TaskStore::new(&config.retention)),
            timeouts: Arc::new(timeouts),
            default_timeout: Duration::from_secs(config.agents.agent_timeout_seconds),
            max_concurrent: config.agents.max_concurrent,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Start (or join) an analysis for a subject. Returns immediately; the
    /// pipeline runs in the background and is observable via `subscribe`.
    pub async fn run_analysis(
        &self,
        subject: &str,
        market_context: serde_json::Value,
    ) -> Result<TaskCreation, EngineError> {
        let creation = self.store.create(subject).await?;
        let TaskCreation::New(task_id) = creation else {
            debug!(subject = %subject, task_id = %creation.task_id(), "Joining analysis already in flight");
            return Ok(creation);
        };

        let token = CancellationToken::new();
        self.lock_cancellations()?.insert(task_id, token.clone());

        info!(subject = %subject, task_id = %task_id, agents = self.agents.len(), "Starting analysis");
        let orchestrator = self.clone();
        let subject = subject.to_string();
        tokio::spawn(async move {
            if let Err(e) = orchestrator
                .pipeline(task_id, &subject, market_context, token)
                .await
            {
                error!(task_id = %task_id, error = %e, "Analysis pipeline error");
                let _ = orchestrator
                    .store
                    .settle(task_id, Err(TaskError::internal(e.to_string())))
                    .await;
            }
            orchestrator.drop_cancellation(task_id);
        });

        Ok(creation)
    }

    /// The agent-then-aggregate pipeline for one freshly created task.
    async fn pipeline(
        &self,
        task_id: Uuid,
        subject: &str,
        market_context: serde_json::Value,
        token: CancellationToken,
    ) -> Result<(), EngineError> {
        if token.is_cancelled() {
            return Ok(());
        }

        self.store.begin(task_id, self.agents.len()).await?;

        let limit = self.max_concurrent.unwrap_or(self.agents.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut cohort: JoinSet<AgentVerdict> = JoinSet::new();

        for agent in &self.agents {
            let agent = Arc::clone(agent);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout_for(agent.id());
            let request = AgentRequest {
                request_id: Uuid::new_v4(),
                subject: subject.to_string(),
                domain: agent.domain().to_string(),
                market_context: market_context.clone(),
            };
            cohort.spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return AgentVerdict::error(agent.id(), "agent pool closed"),
                };
                invoke(agent, request, timeout).await
            });
        }

        // Drain the whole cohort even if the task gets canceled meanwhile:
        // in-flight agents are not aborted, their results are just discarded
        // by the store once the task is terminal.
        let mut verdicts: Vec<AgentVerdict> = Vec::new();
        while let Some(joined) = cohort.join_next().await {
            match joined {
                Ok(verdict) => {
                    self.store
                        .record_agent_result(task_id, verdict.clone())
                        .await?;
                    verdicts.push(verdict);
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Agent worker panicked");
                }
            }
        }

        if token.is_cancelled() {
            debug!(task_id = %task_id, "Task canceled; skipping aggregation");
            return Ok(());
        }

        self.store.begin_aggregation(task_id).await?;
        let outcome = self
            .aggregator
            .aggregate(subject, &verdicts, &market_context)
            .await;
        if let Some(cause) = outcome.fallback_cause {
            self.store.note_aggregation_fallback(task_id, cause).await?;
        }
        self.store.settle(task_id, Ok(outcome.signal)).await?;
        Ok(())
    }

    /// Cancel a task. The task flips to failed immediately; agents still in
    /// flight finish on their own and their results are discarded.
    pub async fn cancel(&self, task_id: Uuid) -> Result<bool, EngineError> {
        let token = self.lock_cancellations()?.get(&task_id).cloned();
        if let Some(token) = token {
            token.cancel();
        }
        let canceled = self.store.cancel(task_id).await?;
        if canceled {
            info!(task_id = %task_id, "Canceled analysis task");
        }
        Ok(canceled)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<AnalysisTask, EngineError> {
        self.store.get(task_id).await
    }

    pub async fn list_history(
        &self,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AnalysisTask>, EngineError> {
        self.store.list_history(subject, limit).await
    }

    pub async fn subscribe(&self, task_id: Uuid) -> Result<EventStream, EngineError> {
        self.store.subscribe(task_id).await
    }

    fn timeout_for(&self, agent_id: &str) -> Duration {
        self.timeouts
            .get(agent_id)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    fn lock_cancellations(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>>, EngineError> {
        self.cancellations
            .lock()
            .map_err(|e| EngineError::Internal(format!("cancellation map lock poisoned: {e}")))
    }

    fn drop_cancellation(&self, task_id: Uuid) {
        if let Ok(mut map) = self.cancellations.lock() {
            map.remove(&task_id);
        }
    }
}
