use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tasq_agents::Synthesizer;
use tasq_models::{AgentVerdict, SignalMethod, SynthesizedPayload, TasqConfig, TradeSignal};
use tracing::{info, warn};

use crate::rules::{aggregate_by_rules, RuleSettings};

/// Result of one aggregation attempt.
pub struct AggregationOutcome {
    pub signal: TradeSignal,
    /// Set when the synthesizer was attempted and failed.
    pub fallback_cause: Option<String>,
}

/// Two-tier aggregation: synthesizer first, deterministic quorum on any
/// synthesizer failure. The fallback never fails.
pub struct Aggregator {
    synthesizer: Option<Arc<dyn Synthesizer>>,
    timeout: Duration,
    rules: RuleSettings,
}

impl Aggregator {
    pub fn new(
        synthesizer: Option<Arc<dyn Synthesizer>>,
        timeout: Duration,
        rules: RuleSettings,
    ) -> Self {
        Self {
            synthesizer,
            timeout,
            rules,
        }
    }

    pub fn from_config(synthesizer: Option<Arc<dyn Synthesizer>>, config: &TasqConfig) -> Self {
        let synthesizer = if config.aggregation.synthesizer.enabled {
            synthesizer
        } else {
            None
        };
        Self::new(
            synthesizer,
            Duration::from_secs(config.aggregation.synthesizer.timeout_seconds),
            RuleSettings::from_config(config),
        )
    }

    /// Combine settled verdicts into one signal.
    ///
    /// The synthesizer is consulted only when it is configured and at least
    /// one verdict is usable. Its output is all-or-nothing: a failure or
    /// timeout discards it entirely and the quorum decides instead.
    pub async fn aggregate(
        &self,
        subject: &str,
        verdicts: &[AgentVerdict],
        market_context: &serde_json::Value,
    ) -> AggregationOutcome {
        let valid: Vec<AgentVerdict> = verdicts
            .iter()
            .filter(|verdict| !verdict.is_error)
            .cloned()
            .collect();

        if let Some(synthesizer) = &self.synthesizer {
            if !valid.is_empty() {
                let attempt = tokio::time::timeout(
                    self.timeout,
                    synthesizer.synthesize(subject, &valid, market_context),
                )
                .await;

                match attempt {
                    Ok(Ok(payload)) => {
                        info!(
                            subject = %subject,
                            direction = %payload.direction,
                            confidence = %payload.confidence,
                            "Synthesized aggregation succeeded"
                        );
                        return AggregationOutcome {
                            signal: self.signal_from_payload(payload, verdicts),
                            fallback_cause: None,
                        };
                    }
                    Ok(Err(e)) => {
                        warn!(subject = %subject, error = %e, "Synthesizer failed; using rule-based fallback");
                        return self.fallback(verdicts, format!("synthesizer failed: {e}"));
                    }
                    Err(_) => {
                        let timeout_s = self.timeout.as_secs();
                        warn!(subject = %subject, timeout_s, "Synthesizer timed out; using rule-based fallback");
                        return self.fallback(verdicts, format!("synthesizer timed out after {timeout_s}s"));
                    }
                }
            }
        }

        AggregationOutcome {
            signal: aggregate_by_rules(verdicts, &self.rules),
            fallback_cause: None,
        }
    }

    fn fallback(&self, verdicts: &[AgentVerdict], cause: String) -> AggregationOutcome {
        AggregationOutcome {
            signal: aggregate_by_rules(verdicts, &self.rules),
            fallback_cause: Some(cause),
        }
    }

    fn signal_from_payload(
        &self,
        payload: SynthesizedPayload,
        verdicts: &[AgentVerdict],
    ) -> TradeSignal {
        let valid: Vec<&AgentVerdict> =
            verdicts.iter().filter(|verdict| !verdict.is_error).collect();
        let agreeing_count = valid
            .iter()
            .filter(|verdict| verdict.direction == payload.direction)
            .count() as u32;

        let position_size = if payload.direction.is_actionable() {
            payload.confidence * self.rules.max_position_fraction
        } else {
            Decimal::ZERO
        };

        TradeSignal {
            direction: payload.direction,
            confidence: payload.confidence,
            position_size,
            agreeing_count,
            total_count: valid.len() as u32,
            warnings: payload.warnings,
            rejection_reason: None,
            method: SignalMethod::Synthesized {
                reasoning: payload.reasoning,
                risk_assessment: payload.risk_assessment,
                key_factors: payload.key_factors,
                price_targets: payload.price_targets,
            },
        }
    }
}
