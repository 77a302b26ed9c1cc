pub mod aggregator;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod rules;
pub mod store;

pub use aggregator::{AggregationOutcome, Aggregator};
pub use error::EngineError;
pub use events::{EventStream, TaskEventLog};
pub use orchestrator::Orchestrator;
pub use rules::{aggregate_by_rules, RuleSettings};
pub use store::{TaskCreation, TaskStore};
