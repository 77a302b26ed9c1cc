use async_trait::async_trait;

use tasq_models::config::SynthesizerConfig;
use tasq_models::{AgentVerdict, SynthesizedPayload};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_synthesis;
use crate::prompts::synthesizer_prompt;

/// Trait for the synthesis stage. Mockable for testing.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        subject: &str,
        verdicts: &[AgentVerdict],
        market_context: &serde_json::Value,
    ) -> Result<SynthesizedPayload, AgentError>;
}

/// A synthesizer that hands the verdict bundle to the Claude CLI.
pub struct CliSynthesizer {
    pub cli_config: ClaudeCliConfig,
}

impl CliSynthesizer {
    pub fn new(cli_config: ClaudeCliConfig) -> Self {
        Self { cli_config }
    }

    pub fn from_config(config: &SynthesizerConfig) -> Self {
        Self::new(ClaudeCliConfig {
            model: config.model.clone(),
            timeout: std::time::Duration::from_secs(config.timeout_seconds),
            ..ClaudeCliConfig::default()
        })
    }
}

#[async_trait]
impl Synthesizer for CliSynthesizer {
    async fn synthesize(
        &self,
        subject: &str,
        verdicts: &[AgentVerdict],
        market_context: &serde_json::Value,
    ) -> Result<SynthesizedPayload, AgentError> {
        let bundle = serde_json::json!({
            "subject": subject,
            "verdicts": verdicts,
            "market_context": market_context,
        });
        let user_prompt = serde_json::to_string(&bundle)?;

        let raw_output =
            invoke_claude(&synthesizer_prompt(), &user_prompt, &self.cli_config).await?;
        parse_synthesis(&raw_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn from_config_carries_model_and_timeout() {
        let config = SynthesizerConfig {
            enabled: true,
            model: "claude-sonnet-4-5-20250929".to_string(),
            timeout_seconds: 12,
        };
        let synthesizer = CliSynthesizer::from_config(&config);
        assert_eq!(synthesizer.cli_config.model, "claude-sonnet-4-5-20250929");
        assert_eq!(synthesizer.cli_config.timeout, Duration::from_secs(12));
    }
}
