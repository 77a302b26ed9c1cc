//! Test support: scripted mock agents and synthesizers.
//!
//! The engine's pipeline tests use these to exercise every settlement path
//! (success, failure, timeout, panic) without the Claude CLI installed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use tasq_models::{AgentRequest, AgentVerdict, Direction, SynthesizedPayload};

use crate::agent::AnalysisAgent;
use crate::error::AgentError;
use crate::synthesizer::Synthesizer;

/// A canned verdict with matching confidence and score.
pub fn verdict(agent_id: &str, direction: Direction, confidence: Decimal) -> AgentVerdict {
    AgentVerdict {
        agent_id: agent_id.to_string(),
        direction,
        confidence,
        score: confidence,
        reasoning: format!("{agent_id} sees {direction}"),
        full_report: format!("Mock {agent_id} report backing a {direction} call."),
        is_error: false,
        elapsed_ms: 1,
    }
}

/// A canned synthesis payload.
pub fn payload(direction: Direction, confidence: Decimal) -> SynthesizedPayload {
    SynthesizedPayload {
        direction,
        confidence,
        reasoning: format!("Synthesis favors {direction}"),
        risk_assessment: "Mock risk assessment".to_string(),
        key_factors: vec!["mock factor".to_string()],
        price_targets: None,
        warnings: vec![],
    }
}

enum AgentBehavior {
    Return(AgentVerdict),
    Fail(String),
    Slow(Duration, AgentVerdict),
    Panic,
}

/// Mock analysis agent with scripted behavior and an invocation counter.
pub struct MockAgent {
    id: String,
    domain: String,
    behavior: AgentBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockAgent {
    fn with_behavior(id: &str, behavior: AgentBehavior) -> Self {
        Self {
            id: id.to_string(),
            domain: id.to_string(),
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(id: &str, verdict: AgentVerdict) -> Self {
        Self::with_behavior(id, AgentBehavior::Return(verdict))
    }

    pub fn failing(id: &str, cause: &str) -> Self {
        Self::with_behavior(id, AgentBehavior::Fail(cause.to_string()))
    }

    pub fn slow(id: &str, delay: Duration, verdict: AgentVerdict) -> Self {
        Self::with_behavior(id, AgentBehavior::Slow(delay, verdict))
    }

    pub fn panicking(id: &str) -> Self {
        Self::with_behavior(id, AgentBehavior::Panic)
    }

    /// Counter handle that stays usable after the agent moves into an
    /// `Arc<dyn AnalysisAgent>`.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AnalysisAgent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self, _request: &AgentRequest) -> Result<AgentVerdict, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            AgentBehavior::Return(verdict) => Ok(verdict.clone()),
            AgentBehavior::Fail(cause) => Err(AgentError::Cli(cause.clone())),
            AgentBehavior::Slow(delay, verdict) => {
                tokio::time::sleep(*delay).await;
                Ok(verdict.clone())
            }
            AgentBehavior::Panic => panic!("mock agent '{}' panicked", self.id),
        }
    }
}

enum SynthBehavior {
    Return(SynthesizedPayload),
    Fail(String),
    Slow(Duration, SynthesizedPayload),
}

/// Mock synthesizer with scripted behavior and an invocation counter.
pub struct MockSynthesizer {
    behavior: SynthBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    fn with_behavior(behavior: SynthBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(payload: SynthesizedPayload) -> Self {
        Self::with_behavior(SynthBehavior::Return(payload))
    }

    pub fn failing(cause: &str) -> Self {
        Self::with_behavior(SynthBehavior::Fail(cause.to_string()))
    }

    pub fn slow(delay: Duration, payload: SynthesizedPayload) -> Self {
        Self::with_behavior(SynthBehavior::Slow(delay, payload))
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        _subject: &str,
        _verdicts: &[AgentVerdict],
        _market_context: &serde_json::Value,
    ) -> Result<SynthesizedPayload, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SynthBehavior::Return(payload) => Ok(payload.clone()),
            SynthBehavior::Fail(cause) => Err(AgentError::Cli(cause.clone())),
            SynthBehavior::Slow(delay, payload) => {
                tokio::time::sleep(*delay).await;
                Ok(payload.clone())
            }
        }
    }
}
