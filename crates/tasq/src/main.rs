use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tasq::build_orchestrator;
use tasq::models::{TaskEvent, TaskStatus, TasqConfig};

#[derive(Parser, Debug)]
#[command(name = "tasq", about = "Trading Agent Signal Quorum")]
struct Cli {
    /// Subject to analyze, e.g. a ticker symbol.
    subject: String,

    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/tasq.toml")]
    config: String,

    /// Read market context from a JSON file.
    #[arg(long)]
    context: Option<String>,

    /// Pretty-print the final task snapshot.
    #[arg(long)]
    pretty: bool,
}

fn load_config(path: &str) -> Result<TasqConfig> {
    if !std::path::Path::new(path).exists() {
        info!(path, "No config file found; using built-in defaults");
        return Ok(TasqConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config file: {path}"))
}

fn load_market_context(path: Option<&str>) -> Result<serde_json::Value> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read market context file: {path}"))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse market context file: {path}"))
        }
        None => Ok(serde_json::json!({})),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let market_context = load_market_context(cli.context.as_deref())?;

    let orchestrator = build_orchestrator(&config)?;
    let creation = orchestrator
        .run_analysis(&cli.subject, market_context)
        .await?;
    let task_id = creation.task_id();
    if !creation.is_new() {
        info!(task_id = %task_id, "Joining analysis already running for this subject");
    }

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(task_id = %task_id, "Interrupt received; canceling analysis");
                let _ = orchestrator.cancel(task_id).await;
            }
        });
    }

    let mut events = orchestrator.subscribe(task_id).await?;
    while let Some(event) = events.next().await {
        match &event {
            TaskEvent::Started { agent_count, .. } => {
                info!(agents = agent_count, "Analysis started");
            }
            TaskEvent::AgentResult { agent_id, verdict } => {
                info!(
                    agent = %agent_id,
                    direction = %verdict.direction,
                    confidence = %verdict.confidence,
                    "Agent settled"
                );
            }
            TaskEvent::AgentError { agent_id, cause } => {
                warn!(agent = %agent_id, cause = %cause, "Agent failed");
            }
            TaskEvent::AggregationStarted => info!("Aggregating verdicts"),
            TaskEvent::AggregationFailed { cause } => {
                warn!(cause = %cause, "Synthesis unavailable; falling back to voting");
            }
            TaskEvent::Completed { .. } | TaskEvent::Failed { .. } => {}
        }
    }

    let task = orchestrator.get_task(task_id).await?;
    let output = if cli.pretty {
        serde_json::to_string_pretty(&task)?
    } else {
        serde_json::to_string(&task)?
    };
    println!("{output}");

    if task.status == TaskStatus::Failed {
        let message = task.error.map(|e| e.message).unwrap_or_default();
        anyhow::bail!("analysis failed: {message}");
    }

    Ok(())
}
