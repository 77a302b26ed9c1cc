use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trade_signal::Direction;

/// Request sent to an analysis agent (serialized as JSON to Claude CLI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub request_id: Uuid,
    /// What is being analyzed, e.g. a ticker symbol.
    pub subject: String,
    /// The agent's assigned domain (e.g., "technical", "macro", "sentiment").
    pub domain: String,
    /// Caller-supplied market snapshot, passed through opaquely.
    pub market_context: serde_json::Value,
}

/// One agent's directional opinion, parsed from its Claude CLI stdout.
///
/// Failed invocations still produce a verdict with `is_error` set; the
/// direction is a `Hold` placeholder and carries no vote weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentVerdict {
    pub agent_id: String,
    pub direction: Direction,
    /// 0.0 to 1.0 conviction in the direction.
    pub confidence: Decimal,
    /// 0.0 to 1.0 strength of the underlying evidence.
    pub score: Decimal,
    /// Short summary, truncated by the invoker.
    pub reasoning: String,
    /// Untruncated analysis text.
    pub full_report: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl AgentVerdict {
    /// Placeholder verdict for an invocation that produced no usable output.
    pub fn error(agent_id: impl Into<String>, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        AgentVerdict {
            agent_id: agent_id.into(),
            direction: Direction::Hold,
            confidence: Decimal::ZERO,
            score: Decimal::ZERO,
            reasoning: cause.clone(),
            full_report: cause,
            is_error: true,
            elapsed_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn roundtrip_agent_request() {
        let request = AgentRequest {
            request_id: Uuid::new_v4(),
            subject: "TSLA".to_string(),
            domain: "technical".to_string(),
            market_context: serde_json::json!({
                "rsi_14": 42.5,
                "sma_20": 205.30,
                "atr_14": 8.75
            }),
        };

        let json = serde_json::to_string(&request).unwrap();
        let deserialized: AgentRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, deserialized);
    }

    #[test]
    fn roundtrip_agent_verdict() {
        let verdict = AgentVerdict {
            agent_id: "technical".to_string(),
            direction: Direction::Long,
            confidence: dec!(0.75),
            score: dec!(0.68),
            reasoning: "RSI indicates oversold conditions".to_string(),
            full_report: "RSI-14 at 28 with price holding the 200-day average.".to_string(),
            is_error: false,
            elapsed_ms: 2400,
        };

        let json = serde_json::to_string(&verdict).unwrap();
        let deserialized: AgentVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(verdict, deserialized);
    }

    #[test]
    fn verdict_parses_without_invoker_fields() {
        // Model output contains only the analytic fields; the invoker fills
        // in is_error and elapsed_ms afterwards.
        let json = r#"{
            "agent_id": "macro",
            "direction": "short",
            "confidence": "0.6",
            "score": "0.55",
            "reasoning": "Rate path repricing hawkish",
            "full_report": "Front-end yields up 30bps this week."
        }"#;

        let verdict: AgentVerdict = serde_json::from_str(json).unwrap();
        assert!(!verdict.is_error);
        assert_eq!(verdict.elapsed_ms, 0);
        assert_eq!(verdict.direction, Direction::Short);
    }

    #[test]
    fn error_verdict_is_inert() {
        let verdict = AgentVerdict::error("sentiment", "timed out after 45 seconds");
        assert!(verdict.is_error);
        assert_eq!(verdict.direction, Direction::Hold);
        assert_eq!(verdict.confidence, Decimal::ZERO);
        assert_eq!(verdict.score, Decimal::ZERO);
        assert_eq!(verdict.reasoning, "timed out after 45 seconds");
    }
}
