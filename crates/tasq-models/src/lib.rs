pub mod agent_message;
pub mod analysis_task;
pub mod config;
pub mod task_event;
pub mod trade_signal;

pub use agent_message::{AgentRequest, AgentVerdict};
pub use analysis_task::{AnalysisTask, TaskError, TaskErrorKind, TaskStatus};
pub use config::{
    AgentSpec, AgentsConfig, AggregationConfig, RetentionConfig, SynthesizerConfig, TasqConfig,
};
pub use task_event::TaskEvent;
pub use trade_signal::{
    Direction, DirectionVote, PriceTargets, SignalMethod, SynthesizedPayload, TradeSignal,
};
