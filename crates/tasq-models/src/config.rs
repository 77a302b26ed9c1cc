use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for TASQ.
///
/// Every section and field has a default, so a partial TOML file (or no
/// file at all) yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TasqConfig {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for TasqConfig {
    fn default() -> Self {
        Self {
            agents: AgentsConfig::default(),
            aggregation: AggregationConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// Configuration for the agent cohort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Default model for agents that don't override it.
    #[serde(default = "default_agent_model")]
    pub default_model: String,
    /// Per-agent invocation timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,
    /// Cap on concurrently running agents. Unset means the whole cohort
    /// runs at once.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default = "default_specialists")]
    pub specialists: Vec<AgentSpec>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_model: default_agent_model(),
            agent_timeout_seconds: default_agent_timeout(),
            max_concurrent: None,
            specialists: default_specialists(),
        }
    }
}

/// Configuration for a single analysis agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    pub domain: String,
    /// Override model for this agent. Falls back to `AgentsConfig::default_model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Vote weight in rule-based aggregation.
    #[serde(default = "default_weight")]
    pub weight: Decimal,
    /// Override timeout for this agent in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AgentSpec {
    fn standard(name: &str) -> Self {
        AgentSpec {
            name: name.to_string(),
            domain: name.to_string(),
            model: None,
            weight: default_weight(),
            timeout_seconds: None,
            enabled: true,
        }
    }
}

/// Configuration for signal aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationConfig {
    /// Signals below this confidence are rejected to a hold.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Signals where fewer than this fraction of agents agree are rejected.
    #[serde(default = "default_min_agreement")]
    pub min_agreement: Decimal,
    /// Ceiling on the position size of any signal.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_agreement: default_min_agreement(),
            max_position_fraction: default_max_position_fraction(),
            synthesizer: SynthesizerConfig::default(),
        }
    }
}

/// Configuration for the synthesizer aggregation strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesizerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_synthesizer_model")]
    pub model: String,
    #[serde(default = "default_synthesizer_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_synthesizer_model(),
            timeout_seconds: default_synthesizer_timeout(),
        }
    }
}

/// Retention policy for settled tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfig {
    /// Maximum number of settled tasks kept for history queries.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: u64,
    /// How long a settled task stays queryable, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_agent_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_agent_timeout() -> u64 {
    45
}

fn default_specialists() -> Vec<AgentSpec> {
    ["technical", "macro", "sentiment", "sector"]
        .iter()
        .map(|name| AgentSpec::standard(name))
        .collect()
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

fn default_enabled() -> bool {
    true
}

fn default_min_confidence() -> Decimal {
    // 0.5
    Decimal::new(5, 1)
}

fn default_min_agreement() -> Decimal {
    Decimal::new(5, 1)
}

fn default_max_position_fraction() -> Decimal {
    // 0.1
    Decimal::new(1, 1)
}

fn default_synthesizer_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_synthesizer_timeout() -> u64 {
    30
}

fn default_max_tasks() -> u64 {
    1024
}

fn default_ttl() -> u64 {
    86_400
}
