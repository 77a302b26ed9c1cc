use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tasq_models::{
    AgentVerdict, AnalysisTask, RetentionConfig, TaskError, TaskEvent, TaskStatus, TradeSignal,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::events::{EventStream, TaskEventLog};

/// Mutable state of one task plus its event log.
///
/// The tokio mutex linearizes all writers to this task; events are always
/// published while it is held, so event order matches mutation order.
pub struct TaskHandle {
    state: Mutex<TaskState>,
    log: Arc<TaskEventLog>,
}

struct TaskState {
    task: AnalysisTask,
    expected_agents: usize,
}

struct Registry {
    active: HashMap<Uuid, Arc<TaskHandle>>,
    by_subject: HashMap<String, Uuid>,
}

/// What `create` did for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCreation {
    New(Uuid),
    /// A task for this subject is still active; no new one was created.
    Existing(Uuid),
}

impl TaskCreation {
    pub fn task_id(&self) -> Uuid {
        match self {
            TaskCreation::New(id) | TaskCreation::Existing(id) => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, TaskCreation::New(_))
    }
}

/// Owns every task's state and enforces the lifecycle rules.
///
/// Active tasks live in the registry; settled tasks move to a bounded,
/// TTL-evicted archive and stay queryable until evicted. The registry lock
/// is never held across an await.
pub struct TaskStore {
    registry: RwLock<Registry>,
    archive: Cache<Uuid, Arc<TaskHandle>>,
}

impl TaskStore {
    pub fn new(retention: &RetentionConfig) -> Self {
        Self {
            registry: RwLock::new(Registry {
                active: HashMap::new(),
                by_subject: HashMap::new(),
            }),
            archive: Cache::builder()
                .max_capacity(retention.max_tasks)
                .time_to_live(Duration::from_secs(retention.ttl_seconds))
                .build(),
        }
    }

    /// Create a task for a subject, or return the one already active.
    ///
    /// The dedup re-checks status under the task's own lock, so a subject
    /// whose task settled a moment ago gets a fresh task instead of the
    /// stale id.
    pub async fn create(&self, subject: &str) -> Result<TaskCreation, EngineError> {
        loop {
            let existing = {
                let registry = self.read()?;
                registry
                    .by_subject
                    .get(subject)
                    .and_then(|id| registry.active.get(id).map(|handle| (*id, Arc::clone(handle))))
            };

            if let Some((task_id, handle)) = existing {
                let state = handle.state.lock().await;
                if !state.task.status.is_terminal() {
                    debug!(subject = %subject, task_id = %task_id, "Reusing active task for subject");
                    return Ok(TaskCreation::Existing(task_id));
                }
                drop(state);
                // Settled but not yet unregistered; clear the subject slot
                // and try again.
                let mut registry = self.write()?;
                if registry.by_subject.get(subject) == Some(&task_id) {
                    registry.by_subject.remove(subject);
                }
                continue;
            }

            let task_id = Uuid::new_v4();
            let handle = Arc::new(TaskHandle {
                state: Mutex::new(TaskState {
                    task: AnalysisTask::new(task_id, subject),
                    expected_agents: 0,
                }),
                log: Arc::new(TaskEventLog::new()),
            });

            {
                let mut registry = self.write()?;
                if let Some(&other) = registry.by_subject.get(subject) {
                    if registry.active.contains_key(&other) {
                        // Lost a race with a concurrent create; re-inspect.
                        continue;
                    }
                }
                registry.active.insert(task_id, handle);
                registry.by_subject.insert(subject.to_string(), task_id);
            }

            info!(subject = %subject, task_id = %task_id, "Created analysis task");
            return Ok(TaskCreation::New(task_id));
        }
    }

    /// Move a pending task to running and record the cohort size.
    pub async fn begin(&self, task_id: Uuid, agent_count: usize) -> Result<(), EngineError> {
        let handle = self.handle(task_id).await?;
        let mut state = handle.state.lock().await;
        if state.task.status != TaskStatus::Pending {
            debug!(task_id = %task_id, status = %state.task.status, "Ignoring begin on non-pending task");
            return Ok(());
        }
        state.task.status = TaskStatus::Running;
        state.task.started_at = Some(Utc::now());
        state.task.current_stage = format!("dispatching {agent_count} agents");
        state.expected_agents = agent_count;
        handle.log.publish(TaskEvent::Started {
            task_id,
            subject: state.task.subject.clone(),
            agent_count,
        });
        Ok(())
    }

    /// Record one agent's verdict and advance progress.
    ///
    /// A result arriving after the task settled is discarded.
    pub async fn record_agent_result(
        &self,
        task_id: Uuid,
        verdict: AgentVerdict,
    ) -> Result<(), EngineError> {
        let handle = self.handle(task_id).await?;
        let mut state = handle.state.lock().await;
        if state.task.status.is_terminal() {
            debug!(task_id = %task_id, agent = %verdict.agent_id, "Discarding agent result for settled task");
            return Ok(());
        }

        state
            .task
            .agent_results
            .insert(verdict.agent_id.clone(), verdict.clone());

        let done = state.task.agent_results.len();
        let total = state.expected_agents.max(done);
        // Agents cover 0-90; aggregation takes the rest.
        let progress = ((done * 90) / total) as u8;
        state.task.progress = state.task.progress.max(progress);
        state.task.current_stage = format!("{done} of {total} agents settled");

        let event = if verdict.is_error {
            TaskEvent::AgentError {
                agent_id: verdict.agent_id.clone(),
                cause: verdict.reasoning.clone(),
            }
        } else {
            TaskEvent::AgentResult {
                agent_id: verdict.agent_id.clone(),
                verdict,
            }
        };
        handle.log.publish(event);
        Ok(())
    }

    /// Mark the cohort settled and aggregation underway.
    pub async fn begin_aggregation(&self, task_id: Uuid) -> Result<(), EngineError> {
        let handle = self.handle(task_id).await?;
        let mut state = handle.state.lock().await;
        if state.task.status.is_terminal() {
            return Ok(());
        }
        state.task.progress = state.task.progress.max(95);
        state.task.current_stage = "aggregating verdicts".to_string();
        handle.log.publish(TaskEvent::AggregationStarted);
        Ok(())
    }

    /// Record that the synthesizer strategy failed and voting took over.
    pub async fn note_aggregation_fallback(
        &self,
        task_id: Uuid,
        cause: String,
    ) -> Result<(), EngineError> {
        let handle = self.handle(task_id).await?;
        let mut state = handle.state.lock().await;
        if state.task.status.is_terminal() {
            return Ok(());
        }
        state.task.current_stage = "rule-based fallback".to_string();
        handle.log.publish(TaskEvent::AggregationFailed { cause });
        Ok(())
    }

    /// Move a task to its terminal state and archive it.
    ///
    /// Returns false if the task was already terminal (the outcome is
    /// discarded). The task is archived before it leaves the registry, so
    /// `get` never has a window where the id is unknown.
    pub async fn settle(
        &self,
        task_id: Uuid,
        outcome: Result<TradeSignal, TaskError>,
    ) -> Result<bool, EngineError> {
        let handle = self.handle(task_id).await?;
        let subject;
        {
            let mut state = handle.state.lock().await;
            if state.task.status.is_terminal() {
                debug!(task_id = %task_id, "Ignoring settle on terminal task");
                return Ok(false);
            }
            state.task.progress = 100;
            state.task.completed_at = Some(Utc::now());
            subject = state.task.subject.clone();

            match outcome {
                Ok(signal) => {
                    let direction = signal.direction;
                    state.task.status = TaskStatus::Completed;
                    state.task.current_stage = "completed".to_string();
                    state.task.signal = Some(signal);
                    info!(task_id = %task_id, subject = %subject, direction = %direction, "Task completed");
                    handle.log.publish(TaskEvent::Completed {
                        task: state.task.clone(),
                    });
                }
                Err(error) => {
                    state.task.status = TaskStatus::Failed;
                    state.task.current_stage = "failed".to_string();
                    state.task.error = Some(error.clone());
                    warn!(task_id = %task_id, subject = %subject, error = %error, "Task failed");
                    handle.log.publish(TaskEvent::Failed { error });
                }
            }
        }

        self.archive.insert(task_id, Arc::clone(&handle)).await;
        {
            let mut registry = self.write()?;
            registry.active.remove(&task_id);
            if registry.by_subject.get(&subject) == Some(&task_id) {
                registry.by_subject.remove(&subject);
            }
        }
        Ok(true)
    }

    /// Cancel a pending or running task. Returns false if it had already
    /// reached a terminal state.
    pub async fn cancel(&self, task_id: Uuid) -> Result<bool, EngineError> {
        self.settle(task_id, Err(TaskError::canceled())).await
    }

    /// Immutable snapshot of a task, active or archived.
    pub async fn get(&self, task_id: Uuid) -> Result<AnalysisTask, EngineError> {
        let handle = self.handle(task_id).await?;
        let state = handle.state.lock().await;
        Ok(state.task.clone())
    }

    /// Snapshots of known tasks, newest first, optionally filtered by
    /// subject.
    pub async fn list_history(
        &self,
        subject: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AnalysisTask>, EngineError> {
        let mut handles: Vec<Arc<TaskHandle>> = {
            let registry = self.read()?;
            registry.active.values().cloned().collect()
        };
        for (_, handle) in self.archive.iter() {
            handles.push(handle);
        }

        let mut tasks: Vec<AnalysisTask> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        for handle in handles {
            let state = handle.state.lock().await;
            if !seen.insert(state.task.task_id) {
                continue;
            }
            if let Some(filter) = subject {
                if state.task.subject != filter {
                    continue;
                }
            }
            tasks.push(state.task.clone());
        }

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        Ok(tasks)
    }

    /// Stream a task's events: full replay, then live updates.
    pub async fn subscribe(&self, task_id: Uuid) -> Result<EventStream, EngineError> {
        let handle = self.handle(task_id).await?;
        Arc::clone(&handle.log).subscribe()
    }

    async fn handle(&self, task_id: Uuid) -> Result<Arc<TaskHandle>, EngineError> {
        let active = {
            let registry = self.read()?;
            registry.active.get(&task_id).cloned()
        };
        if let Some(handle) = active {
            return Ok(handle);
        }
        self.archive
            .get(&task_id)
            .await
            .ok_or(EngineError::TaskNotFound(task_id))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Registry>, EngineError> {
        self.registry
            .read()
            .map_err(|e| EngineError::Internal(format!("task registry lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Registry>, EngineError> {
        self.registry
            .write()
            .map_err(|e| EngineError::Internal(format!("task registry lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasq_agents::test_support::verdict;
    use tasq_models::{Direction, SignalMethod, TaskErrorKind};

    fn store() -> TaskStore {
        TaskStore::new(&RetentionConfig::default())
    }

    fn signal() -> TradeSignal {
        TradeSignal {
            direction: Direction::Long,
            confidence: dec!(0.8),
            position_size: dec!(0.08),
            agreeing_count: 3,
            total_count: 4,
            warnings: vec![],
            rejection_reason: None,
            method: SignalMethod::RuleBased { votes: vec![] },
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = store();
        let creation = store.create("AAPL").await.unwrap();
        assert!(creation.is_new());

        let task = store.get(creation.task_id()).await.unwrap();
        assert_eq!(task.subject, "AAPL");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
    }

    #[tokio::test]
    async fn duplicate_subject_reuses_active_task() {
        let store = store();
        let first = store.create("AAPL").await.unwrap();
        let second = store.create("AAPL").await.unwrap();

        assert!(first.is_new());
        assert_eq!(second, TaskCreation::Existing(first.task_id()));

        let other = store.create("MSFT").await.unwrap();
        assert!(other.is_new());
        assert_ne!(other.task_id(), first.task_id());
    }

    #[tokio::test]
    async fn settled_subject_gets_a_fresh_task() {
        let store = store();
        let first = store.create("AAPL").await.unwrap();
        store.settle(first.task_id(), Ok(signal())).await.unwrap();

        let second = store.create("AAPL").await.unwrap();
        assert!(second.is_new());
        assert_ne!(second.task_id(), first.task_id());
    }

    #[tokio::test]
    async fn progress_tracks_settled_agents() {
        let store = store();
        let task_id = store.create("AAPL").await.unwrap().task_id();
        store.begin(task_id, 4).await.unwrap();

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());
        assert_eq!(task.current_stage, "dispatching 4 agents");

        store
            .record_agent_result(task_id, verdict("technical", Direction::Long, dec!(0.8)))
            .await
            .unwrap();
        store
            .record_agent_result(task_id, verdict("macro", Direction::Long, dec!(0.7)))
            .await
            .unwrap();

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.progress, 45);
        assert_eq!(task.current_stage, "2 of 4 agents settled");
        assert_eq!(task.agent_results.len(), 2);

        store.begin_aggregation(task_id).await.unwrap();
        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.progress, 95);
    }

    #[tokio::test]
    async fn settle_completes_once() {
        let store = store();
        let task_id = store.create("AAPL").await.unwrap().task_id();
        store.begin(task_id, 1).await.unwrap();

        assert!(store.settle(task_id, Ok(signal())).await.unwrap());
        assert!(!store.settle(task_id, Ok(signal())).await.unwrap());

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.completed_at.is_some());
        assert!(task.signal.is_some());
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn cancel_marks_failed_with_cancellation_error() {
        let store = store();
        let task_id = store.create("AAPL").await.unwrap().task_id();

        assert!(store.cancel(task_id).await.unwrap());
        assert!(!store.cancel(task_id).await.unwrap());

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_ref().unwrap().kind, TaskErrorKind::Canceled);
        assert!(task.signal.is_none());
    }

    #[tokio::test]
    async fn late_agent_result_is_discarded() {
        let store = store();
        let task_id = store.create("AAPL").await.unwrap().task_id();
        store.begin(task_id, 2).await.unwrap();
        store.cancel(task_id).await.unwrap();

        store
            .record_agent_result(task_id, verdict("technical", Direction::Long, dec!(0.8)))
            .await
            .unwrap();

        let task = store.get(task_id).await.unwrap();
        assert!(task.agent_results.is_empty());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_task_id_is_not_found() {
        let store = store();
        let missing = Uuid::new_v4();

        let result = store.get(missing).await;
        assert!(matches!(result, Err(EngineError::TaskNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_filterable() {
        let store = store();

        let first = store.create("AAPL").await.unwrap().task_id();
        store.settle(first, Ok(signal())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = store.create("MSFT").await.unwrap().task_id();
        store.settle(second, Ok(signal())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let third = store.create("AAPL").await.unwrap().task_id();

        let all = store.list_history(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].task_id, third);
        assert_eq!(all[1].task_id, second);
        assert_eq!(all[2].task_id, first);

        let apple = store.list_history(Some("AAPL"), 10).await.unwrap();
        assert_eq!(apple.len(), 2);
        assert!(apple.iter().all(|t| t.subject == "AAPL"));

        let limited = store.list_history(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].task_id, third);
    }

    #[tokio::test]
    async fn retention_ttl_evicts_settled_tasks() {
        let retention = RetentionConfig {
            max_tasks: 8,
            ttl_seconds: 1,
        };
        let store = TaskStore::new(&retention);
        let task_id = store.create("AAPL").await.unwrap().task_id();
        store.settle(task_id, Ok(signal())).await.unwrap();

        let task = store.get(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        tokio::time::sleep(Duration::from_millis(1600)).await;

        let result = store.get(task_id).await;
        assert!(matches!(result, Err(EngineError::TaskNotFound(id)) if id == task_id));
        let history = store.list_history(Some("AAPL"), 10).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn subscriber_after_settlement_gets_full_replay() {
        let store = store();
        let task_id = store.create("AAPL").await.unwrap().task_id();
        store.begin(task_id, 2).await.unwrap();
        store
            .record_agent_result(task_id, verdict("technical", Direction::Long, dec!(0.8)))
            .await
            .unwrap();
        store
            .record_agent_result(task_id, AgentVerdict::error("macro", "timed out after 45s"))
            .await
            .unwrap();
        store.begin_aggregation(task_id).await.unwrap();
        store.settle(task_id, Ok(signal())).await.unwrap();

        let mut stream = store.subscribe(task_id).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], TaskEvent::Started { agent_count: 2, .. }));
        assert!(matches!(events[1], TaskEvent::AgentResult { .. }));
        assert!(matches!(events[2], TaskEvent::AgentError { .. }));
        assert!(matches!(events[3], TaskEvent::AggregationStarted));
        assert!(events[4].is_terminal());
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }
}
