use std::collections::HashMap;

use rust_decimal::Decimal;
use tasq_models::{
    AgentVerdict, Direction, DirectionVote, SignalMethod, TasqConfig, TradeSignal,
};

/// Tunables for the weighted-vote fallback.
#[derive(Debug, Clone)]
pub struct RuleSettings {
    /// Per-agent vote weight, keyed by agent id. Unknown agents weigh 1.
    pub weights: HashMap<String, Decimal>,
    pub min_confidence: Decimal,
    pub min_agreement: Decimal,
    pub max_position_fraction: Decimal,
}

impl RuleSettings {
    pub fn from_config(config: &TasqConfig) -> Self {
        let weights = config
            .agents
            .specialists
            .iter()
            .map(|spec| (spec.name.clone(), spec.weight))
            .collect();

        Self {
            weights,
            min_confidence: config.aggregation.min_confidence,
            min_agreement: config.aggregation.min_agreement,
            max_position_fraction: config.aggregation.max_position_fraction,
        }
    }

    fn weight_of(&self, agent_id: &str) -> Decimal {
        self.weights.get(agent_id).copied().unwrap_or(Decimal::ONE)
    }
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self::from_config(&TasqConfig::default())
    }
}

/// Deterministic weighted-vote aggregation over settled agent verdicts.
///
/// Pure: no clock, no I/O. Identical verdicts and settings always produce
/// an identical signal. Error verdicts carry zero vote weight but leave a
/// warning behind.
pub fn aggregate_by_rules(verdicts: &[AgentVerdict], settings: &RuleSettings) -> TradeSignal {
    let mut warnings: Vec<String> = verdicts
        .iter()
        .filter(|verdict| verdict.is_error)
        .map(|verdict| format!("Agent '{}' errored: {}", verdict.agent_id, verdict.reasoning))
        .collect();

    let valid: Vec<&AgentVerdict> = verdicts.iter().filter(|verdict| !verdict.is_error).collect();
    let total_count = valid.len() as u32;

    if valid.is_empty() {
        let reason = "no valid agent results".to_string();
        warnings.push(reason.clone());
        return TradeSignal {
            direction: Direction::Hold,
            confidence: Decimal::ZERO,
            position_size: Decimal::ZERO,
            agreeing_count: 0,
            total_count,
            warnings,
            rejection_reason: Some(reason),
            method: SignalMethod::RuleBased {
                votes: empty_tally(),
            },
        };
    }

    // Tally weighted conviction per direction, in canonical reporting order.
    let votes: Vec<DirectionVote> = Direction::ALL
        .iter()
        .map(|&direction| {
            let mut weight = Decimal::ZERO;
            let mut voters = 0u32;
            for verdict in &valid {
                if verdict.direction == direction {
                    weight += settings.weight_of(&verdict.agent_id) * verdict.confidence;
                    voters += 1;
                }
            }
            DirectionVote {
                direction,
                weight,
                voters,
            }
        })
        .collect();

    let total_mass: Decimal = votes.iter().map(|vote| vote.weight).sum();
    let top_weight = votes
        .iter()
        .map(|vote| vote.weight)
        .max()
        .unwrap_or(Decimal::ZERO);
    let leaders: Vec<Direction> = votes
        .iter()
        .filter(|vote| vote.weight == top_weight)
        .map(|vote| vote.direction)
        .collect();

    // Ties resolve to hold: ambiguity is not a tradeable signal.
    let winner = if leaders.len() == 1 {
        leaders[0]
    } else {
        let tied = leaders
            .iter()
            .map(Direction::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(format!("Tied vote between {tied}; holding"));
        Direction::Hold
    };

    let winner_mass = votes
        .iter()
        .find(|vote| vote.direction == winner)
        .map(|vote| vote.weight)
        .unwrap_or(Decimal::ZERO);

    let confidence = winner_mass.checked_div(total_mass).unwrap_or(Decimal::ZERO);
    let agreeing_count = valid
        .iter()
        .filter(|verdict| verdict.direction == winner)
        .count() as u32;
    let agreement = Decimal::from(agreeing_count)
        .checked_div(Decimal::from(total_count))
        .unwrap_or(Decimal::ZERO);

    let rejection = if confidence < settings.min_confidence {
        Some(format!(
            "confidence {:.2} below minimum {:.2}",
            confidence, settings.min_confidence
        ))
    } else if agreement < settings.min_agreement {
        Some(format!(
            "agreement {:.2} below minimum {:.2} ({agreeing_count} of {total_count} agents)",
            agreement, settings.min_agreement
        ))
    } else {
        None
    };

    let method = SignalMethod::RuleBased { votes };

    match rejection {
        Some(reason) => {
            warnings.push(reason.clone());
            TradeSignal {
                direction: Direction::Hold,
                confidence,
                position_size: Decimal::ZERO,
                agreeing_count,
                total_count,
                warnings,
                rejection_reason: Some(reason),
                method,
            }
        }
        None => {
            let position_size = if winner.is_actionable() {
                confidence * settings.max_position_fraction
            } else {
                Decimal::ZERO
            };
            TradeSignal {
                direction: winner,
                confidence,
                position_size,
                agreeing_count,
                total_count,
                warnings,
                rejection_reason: None,
                method,
            }
        }
    }
}

fn empty_tally() -> Vec<DirectionVote> {
    Direction::ALL
        .iter()
        .map(|&direction| DirectionVote {
            direction,
            weight: Decimal::ZERO,
            voters: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasq_agents::test_support::verdict;
    use tasq_models::AgentSpec;

    fn equal_weight_settings() -> RuleSettings {
        RuleSettings::default()
    }

    fn long_short_long_long() -> Vec<AgentVerdict> {
        vec![
            verdict("technical", Direction::Long, dec!(0.8)),
            verdict("macro", Direction::Long, dec!(0.7)),
            verdict("sentiment", Direction::Short, dec!(0.5)),
            verdict("sector", Direction::Long, dec!(0.6)),
        ]
    }

    #[test]
    fn quorum_of_three_longs_wins() {
        let signal = aggregate_by_rules(&long_short_long_long(), &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.agreeing_count, 3);
        assert_eq!(signal.total_count, 4);
        // 2.1 of 2.6 total weighted conviction
        assert_eq!(signal.confidence.round_dp(3), dec!(0.808));
        assert!(!signal.is_rejected());
        assert_eq!(
            signal.position_size.round_dp(4),
            (signal.confidence * dec!(0.1)).round_dp(4)
        );

        match &signal.method {
            SignalMethod::RuleBased { votes } => {
                assert_eq!(votes.len(), 4);
                assert_eq!(votes[0].direction, Direction::Long);
                assert_eq!(votes[0].weight, dec!(2.1));
                assert_eq!(votes[0].voters, 3);
                assert_eq!(votes[1].direction, Direction::Short);
                assert_eq!(votes[1].weight, dec!(0.5));
                assert_eq!(votes[1].voters, 1);
            }
            other => panic!("expected rule-based method, got {other:?}"),
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let verdicts = long_short_long_long();
        let settings = equal_weight_settings();

        let first = aggregate_by_rules(&verdicts, &settings);
        let second = aggregate_by_rules(&verdicts, &settings);

        assert_eq!(first, second);
    }

    #[test]
    fn all_errors_reject_with_reason() {
        let verdicts = vec![
            AgentVerdict::error("technical", "timed out after 45s"),
            AgentVerdict::error("macro", "Claude CLI error: exit 1"),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Hold);
        assert_eq!(signal.rejection_reason.as_deref(), Some("no valid agent results"));
        assert_eq!(signal.agreeing_count, 0);
        assert_eq!(signal.total_count, 0);
        assert_eq!(signal.position_size, Decimal::ZERO);
        assert!(signal
            .warnings
            .iter()
            .any(|w| w.contains("technical") && w.contains("timed out")));
    }

    #[test]
    fn tied_vote_resolves_to_hold() {
        let verdicts = vec![
            verdict("technical", Direction::Long, dec!(0.6)),
            verdict("macro", Direction::Short, dec!(0.6)),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Hold);
        assert!(signal
            .warnings
            .iter()
            .any(|w| w.contains("Tied vote between long, short")));
        // Nobody voted hold, so the forced winner carries no conviction.
        assert!(signal.is_rejected());
        assert_eq!(signal.confidence, Decimal::ZERO);
    }

    #[test]
    fn low_confidence_forces_hold() {
        let verdicts = vec![
            verdict("technical", Direction::Long, dec!(0.45)),
            verdict("macro", Direction::Short, dec!(0.3)),
            verdict("sentiment", Direction::Hold, dec!(0.25)),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Hold);
        let reason = signal.rejection_reason.as_deref().unwrap();
        assert!(reason.contains("confidence 0.45 below minimum 0.50"), "{reason}");
        // The tally still reflects the raw winner.
        assert_eq!(signal.agreeing_count, 1);
        assert_eq!(signal.position_size, Decimal::ZERO);
        assert!(signal.warnings.iter().any(|w| w == reason));
    }

    #[test]
    fn low_agreement_forces_hold() {
        let verdicts = vec![
            verdict("technical", Direction::Long, dec!(0.9)),
            verdict("macro", Direction::Long, dec!(0.9)),
            verdict("sentiment", Direction::Short, dec!(0.3)),
            verdict("sector", Direction::Hold, dec!(0.3)),
            verdict("flow", Direction::Close, dec!(0.3)),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        // Confidence clears the bar (1.8 of 2.7) but only 2 of 5 agents agree.
        assert_eq!(signal.direction, Direction::Hold);
        let reason = signal.rejection_reason.as_deref().unwrap();
        assert!(reason.contains("agreement 0.40 below minimum 0.50"), "{reason}");
        assert!(reason.contains("2 of 5 agents"), "{reason}");
    }

    #[test]
    fn configured_weights_shift_the_vote() {
        let mut settings = equal_weight_settings();
        settings.weights.insert("macro".to_string(), dec!(2));

        let verdicts = vec![
            verdict("technical", Direction::Long, dec!(0.5)),
            verdict("macro", Direction::Short, dec!(0.5)),
        ];

        let signal = aggregate_by_rules(&verdicts, &settings);

        // 1.0 short mass vs 0.5 long mass
        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.confidence.round_dp(3), dec!(0.667));
        assert!(!signal.is_rejected());
    }

    #[test]
    fn unanimous_hold_is_not_a_rejection() {
        let verdicts = vec![
            verdict("technical", Direction::Hold, dec!(0.8)),
            verdict("macro", Direction::Hold, dec!(0.7)),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Hold);
        assert!(!signal.is_rejected());
        assert_eq!(signal.confidence, Decimal::ONE);
        assert_eq!(signal.position_size, Decimal::ZERO);
    }

    #[test]
    fn error_verdicts_warn_but_do_not_vote() {
        let verdicts = vec![
            verdict("technical", Direction::Long, dec!(0.8)),
            AgentVerdict::error("macro", "no data feed"),
        ];

        let signal = aggregate_by_rules(&verdicts, &equal_weight_settings());

        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.agreeing_count, 1);
        assert_eq!(signal.total_count, 1);
        assert_eq!(signal.confidence, Decimal::ONE);
        assert!(signal.warnings.iter().any(|w| w.contains("no data feed")));
    }

    #[test]
    fn settings_come_from_config() {
        let mut config = TasqConfig::default();
        config.aggregation.min_confidence = dec!(0.7);
        config.agents.specialists = vec![AgentSpec {
            name: "macro".to_string(),
            domain: "macro".to_string(),
            model: None,
            weight: dec!(2.5),
            timeout_seconds: None,
            enabled: true,
        }];

        let settings = RuleSettings::from_config(&config);

        assert_eq!(settings.min_confidence, dec!(0.7));
        assert_eq!(settings.weight_of("macro"), dec!(2.5));
        assert_eq!(settings.weight_of("unlisted"), Decimal::ONE);
    }
}
