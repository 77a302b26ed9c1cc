use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Binary to spawn. Tests swap this for a stand-in.
    pub program: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Invoke the `claude` CLI with a system prompt, piping the user prompt
/// over stdin. Returns the raw stdout text.
///
/// The prompt goes over stdin rather than argv so that large payloads
/// (full verdict bundles, market snapshots) don't hit argument limits.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(program = %config.program, model = %config.model, prompt_bytes = user_prompt.len(), "Invoking claude CLI");

    let output = tokio::time::timeout(
        config.timeout,
        run_claude(system_prompt, user_prompt, config),
    )
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "{} exited {}: {}",
            config.program, output.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

async fn run_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<std::process::Output, AgentError> {
    let mut child = Command::new(&config.program)
        .args([
            "-p",
            "--system-prompt",
            system_prompt,
            "--model",
            &config.model,
            "--output-format",
            "text",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.program)))?;

    // Close stdin after writing so the CLI sees EOF and starts responding.
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(user_prompt.as_bytes())
            .await
            .map_err(|e| AgentError::Cli(format!("Failed to write prompt to claude: {e}")))?;
    }

    child
        .wait_with_output()
        .await
        .map_err(|e| AgentError::Cli(format!("Failed to collect claude output: {e}")))
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
