use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::BTreeMap;
use std::fmt;

use crate::agent_message::AgentVerdict;
use crate::trade_signal::TradeSignal;

/// Lifecycle state of an analysis task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, agents not yet dispatched.
    Pending,
    /// Agents in flight or aggregation underway.
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Machine-checkable category for a failed task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Caller asked for the task to stop.
    Canceled,
    /// Aggregation raised instead of producing a signal.
    Aggregation,
    /// Pipeline bookkeeping failed.
    Internal,
}

/// Why a task ended in `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn canceled() -> Self {
        TaskError {
            kind: TaskErrorKind::Canceled,
            message: "task canceled by caller".to_string(),
        }
    }

    pub fn aggregation(message: impl Into<String>) -> Self {
        TaskError {
            kind: TaskErrorKind::Aggregation,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TaskError {
            kind: TaskErrorKind::Internal,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Observable snapshot of one analysis run, from creation to settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisTask {
    pub task_id: Uuid,
    pub subject: String,
    pub status: TaskStatus,
    /// 0-100; never decreases, reaches 100 only in a terminal state.
    pub progress: u8,
    /// Free-text description of what the task is doing right now.
    pub current_stage: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Verdicts keyed by agent id, in deterministic order.
    pub agent_results: BTreeMap<String, AgentVerdict>,
    /// Present once the task completes successfully.
    pub signal: Option<TradeSignal>,
    /// Present once the task fails.
    pub error: Option<TaskError>,
}

impl AnalysisTask {
    /// A freshly created task, before any agent has been dispatched.
    pub fn new(task_id: Uuid, subject: impl Into<String>) -> Self {
        AnalysisTask {
            task_id,
            subject: subject.into(),
            status: TaskStatus::Pending,
            progress: 0,
            current_stage: "queued".to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            agent_results: BTreeMap::new(),
            signal: None,
            error: None,
        }
    }
}
