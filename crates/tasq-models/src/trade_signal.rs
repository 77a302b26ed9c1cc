use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use std::fmt;

/// Directional stance an agent (or the final signal) takes on a subject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Open or add to a long position.
    Long,
    /// Open or add to a short position.
    Short,
    /// Take no action.
    Hold,
    /// Exit any existing position.
    Close,
}

impl Direction {
    /// All directions in canonical reporting order.
    pub const ALL: [Direction; 4] = [
        Direction::Long,
        Direction::Short,
        Direction::Hold,
        Direction::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Hold => "hold",
            Direction::Close => "close",
        }
    }

    /// Whether this direction implies taking or keeping market exposure.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Direction::Hold)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price levels attached to a synthesized signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTargets {
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Weighted vote tally for one direction in a rule-based aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionVote {
    pub direction: Direction,
    /// Sum of weight * confidence over agents that voted this direction.
    pub weight: Decimal,
    /// Number of agents that voted this direction.
    pub voters: u32,
}

/// How the final signal was produced, with strategy-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalMethod {
    /// A synthesizer model read every agent verdict and wrote the conclusion.
    Synthesized {
        reasoning: String,
        risk_assessment: String,
        key_factors: Vec<String>,
        price_targets: Option<PriceTargets>,
    },
    /// Deterministic weighted voting over agent verdicts.
    RuleBased { votes: Vec<DirectionVote> },
}

/// The final aggregated output of an analysis task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub direction: Direction,
    /// 0.0 to 1.0 conviction behind the direction.
    pub confidence: Decimal,
    /// Fraction of capital to deploy; 0 for hold or rejected signals.
    pub position_size: Decimal,
    /// Agents whose direction matched the final one.
    pub agreeing_count: u32,
    /// Agents whose verdicts were usable (errors excluded).
    pub total_count: u32,
    pub warnings: Vec<String>,
    /// Set when thresholds forced the signal down to a hold.
    pub rejection_reason: Option<String>,
    pub method: SignalMethod,
}

impl TradeSignal {
    pub fn is_rejected(&self) -> bool {
        self.rejection_reason.is_some()
    }
}

/// Structured body a synthesizer must produce; validated before trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesizedPayload {
    pub direction: Direction,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub reasoning: String,
    pub risk_assessment: String,
    pub key_factors: Vec<String>,
    pub price_targets: Option<PriceTargets>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_signal() -> TradeSignal {
        TradeSignal {
            direction: Direction::Long,
            confidence: dec!(0.81),
            position_size: dec!(0.081),
            agreeing_count: 3,
            total_count: 4,
            warnings: vec!["agent sector returned an error verdict".to_string()],
            rejection_reason: None,
            method: SignalMethod::RuleBased {
                votes: vec![
                    DirectionVote {
                        direction: Direction::Long,
                        weight: dec!(2.1),
                        voters: 3,
                    },
                    DirectionVote {
                        direction: Direction::Short,
                        weight: dec!(0.5),
                        voters: 1,
                    },
                    DirectionVote {
                        direction: Direction::Hold,
                        weight: dec!(0),
                        voters: 0,
                    },
                    DirectionVote {
                        direction: Direction::Close,
                        weight: dec!(0),
                        voters: 0,
                    },
                ],
            },
        }
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Long).unwrap(), "\"long\"");
        assert_eq!(
            serde_json::to_string(&Direction::Short).unwrap(),
            "\"short\""
        );
        assert_eq!(serde_json::to_string(&Direction::Hold).unwrap(), "\"hold\"");
        assert_eq!(
            serde_json::to_string(&Direction::Close).unwrap(),
            "\"close\""
        );
    }

    #[test]
    fn roundtrip_rule_based_signal() {
        let signal = sample_signal();
        let json = serde_json::to_string(&signal).unwrap();
        let deserialized: TradeSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, deserialized);
    }

    #[test]
    fn roundtrip_synthesized_signal() {
        let signal = TradeSignal {
            direction: Direction::Short,
            confidence: dec!(0.66),
            position_size: dec!(0.066),
            agreeing_count: 2,
            total_count: 3,
            warnings: vec![],
            rejection_reason: None,
            method: SignalMethod::Synthesized {
                reasoning: "Breadth deteriorating while price makes new highs".to_string(),
                risk_assessment: "Squeeze risk if short interest builds".to_string(),
                key_factors: vec![
                    "negative divergence on RSI-14".to_string(),
                    "sector rotation out of growth".to_string(),
                ],
                price_targets: Some(PriceTargets {
                    entry: dec!(242.50),
                    stop_loss: dec!(251.00),
                    take_profit: dec!(224.00),
                }),
            },
        };

        let json = serde_json::to_string(&signal).unwrap();
        let deserialized: TradeSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, deserialized);
    }

    #[test]
    fn method_tag_is_snake_case() {
        let signal = sample_signal();
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["method"]["kind"], "rule_based");
    }

    #[test]
    fn payload_warnings_default_to_empty() {
        let json = r#"{
            "direction": "hold",
            "confidence": "0.4",
            "reasoning": "Mixed picture",
            "risk_assessment": "Low, no position taken",
            "key_factors": [],
            "price_targets": null
        }"#;
        let payload: SynthesizedPayload = serde_json::from_str(json).unwrap();
        assert!(payload.warnings.is_empty());
        assert_eq!(payload.direction, Direction::Hold);
    }

    #[test]
    fn actionable_directions() {
        assert!(Direction::Long.is_actionable());
        assert!(Direction::Short.is_actionable());
        assert!(Direction::Close.is_actionable());
        assert!(!Direction::Hold.is_actionable());
    }
}
