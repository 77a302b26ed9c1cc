use std::time::Duration;

use async_trait::async_trait;

use tasq_models::config::{AgentSpec, AgentsConfig};
use tasq_models::{AgentRequest, AgentVerdict};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_verdict;
use crate::prompts::agent_prompt;

/// Trait for analysis agents. Mockable for testing.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    fn id(&self) -> &str;
    fn domain(&self) -> &str;

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, AgentError>;
}

/// An analysis agent that invokes the Claude CLI.
pub struct CliAgent {
    pub id: String,
    pub domain: String,
    pub cli_config: ClaudeCliConfig,
}

impl CliAgent {
    pub fn new(id: String, domain: String, model: String, timeout: Duration) -> Self {
        Self {
            id,
            domain,
            cli_config: ClaudeCliConfig {
                model,
                timeout,
                ..ClaudeCliConfig::default()
            },
        }
    }

    /// Build an agent from its config entry, filling unset fields from the
    /// cohort-wide defaults.
    pub fn from_spec(spec: &AgentSpec, defaults: &AgentsConfig) -> Self {
        let model = spec
            .model
            .clone()
            .unwrap_or_else(|| defaults.default_model.clone());
        let timeout = Duration::from_secs(
            spec.timeout_seconds
                .unwrap_or(defaults.agent_timeout_seconds),
        );
        Self::new(spec.name.clone(), spec.domain.clone(), model, timeout)
    }
}

#[async_trait]
impl AnalysisAgent for CliAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, AgentError> {
        let system_prompt = agent_prompt(&self.domain).ok_or_else(|| {
            AgentError::Cli(format!("No system prompt for domain: {}", self.domain))
        })?;

        let user_prompt = serde_json::to_string(request)?;
        let raw_output = invoke_claude(&system_prompt, &user_prompt, &self.cli_config).await?;
        let mut verdict = parse_verdict(&raw_output)?;

        // The model sometimes echoes a different id; pin our own.
        verdict.agent_id = self.id.clone();
        Ok(verdict)
    }
}
