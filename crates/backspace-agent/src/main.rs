use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use backspace_agent::config::AgentConfig;
use backspace_agent::probe::Probe;
use backspace_agent::server::{self, AppState};
use backspace_agent::telemetry::TracingObserver;
use backspace_agent::workflow::{CodingWorkflow, WorkflowRequest};
use backspace_engine::events::{EventEmitter, ProgressEvent};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "backspace-agent")]
#[command(about = "Apply prompted changes to a GitHub repository and open a pull request")]
struct Cli {
    /// TOML file overriding non-secret settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP/SSE API
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one request in-process, printing events as JSON lines
    Run {
        #[arg(long)]
        repo_url: String,
        #[arg(long)]
        prompt: String,
    },
    /// Check a running server and optionally follow one request
    Probe {
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        base_url: String,
        #[arg(long, requires = "prompt")]
        repo_url: Option<String>,
        #[arg(long, requires = "repo_url")]
        prompt: Option<String>,
    },
}

fn print_event(event: &ProgressEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            info!(
                planner = %config.planner.url,
                model = %config.planner.model,
                max_attempts = config.retry.max_attempts,
                "Backspace agent starting"
            );
            let workflow = CodingWorkflow::from_config(Arc::new(config))?;
            let state = AppState::new(workflow, Arc::new(TracingObserver::new()));
            server::serve(state, &bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { repo_url, prompt } => {
            let workflow = CodingWorkflow::from_config(Arc::new(config.clone()))?
                .with_observer(Arc::new(TracingObserver::new()));
            let (events, mut rx) = EventEmitter::channel(config.heartbeat_interval());
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_event(&event);
                }
            });
            let request = WorkflowRequest { repo_url, prompt };
            let summary = workflow.run(&request, events).await;
            printer.await?;
            Ok(if summary.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Probe {
            base_url,
            repo_url,
            prompt,
        } => {
            let probe = Probe::new(base_url);
            probe.health().await?;
            let (Some(repo_url), Some(prompt)) = (repo_url, prompt) else {
                return Ok(ExitCode::SUCCESS);
            };
            let report = probe.run(&repo_url, &prompt, print_event).await?;
            info!(
                events = report.events,
                heartbeats = report.heartbeats,
                outcome = ?report.outcome,
                "Stream finished"
            );
            Ok(if report.outcome.is_success() && report.after_terminal == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
