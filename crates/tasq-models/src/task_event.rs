use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_message::AgentVerdict;
use crate::analysis_task::{AnalysisTask, TaskError};

/// One entry in a task's append-only event log.
///
/// Events are published in the order the task mutated; the stream for any
/// task ends with exactly one terminal event (`Completed` or `Failed`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Agents have been dispatched.
    Started {
        task_id: Uuid,
        subject: String,
        agent_count: usize,
    },
    /// An agent returned a usable verdict.
    AgentResult {
        agent_id: String,
        verdict: AgentVerdict,
    },
    /// An agent invocation failed; an error verdict was recorded instead.
    AgentError { agent_id: String, cause: String },
    /// All agents settled; aggregation is underway.
    AggregationStarted,
    /// The synthesizer strategy failed; falling back to rule-based voting.
    AggregationFailed { cause: String },
    /// Terminal: the task produced a signal. Carries the final snapshot.
    Completed { task: AnalysisTask },
    /// Terminal: the task ended without a signal.
    Failed { error: TaskError },
}

impl TaskEvent {
    /// True for the event that closes a task's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Completed { .. } | TaskEvent::Failed { .. })
    }
}
