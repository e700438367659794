use std::path::PathBuf;

use clap::Parser;
use visionpilot_lib::agent_engine::event_bus::{EventBus, LoopEvent};
use visionpilot_lib::agent_engine::state::TerminalState;
use visionpilot_lib::commands::TaskRunner;
use visionpilot_lib::config;

#[derive(Parser)]
#[command(name = "visionpilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive the desktop from screenshots and a multimodal model", long_about = None)]
struct Cli {
    /// What the agent should do, in plain language
    task: String,

    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Iteration cap for this run (bounded by execution.max_visual_model_iterations)
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    visionpilot_lib::init_tracing();

    let cli = Cli::parse();

    let cfg = match config::load_config_or_default(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(2);
        }
    };
    if !cfg.api.has_credential() {
        tracing::warn!(
            "no API key configured (api.api_key or {}); decision calls will be skipped",
            config::API_KEY_ENV
        );
    }

    let mut runner = TaskRunner::new(cfg, cli.config.clone());
    let (events, mut event_rx) = EventBus::new(64);

    let listener = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                LoopEvent::Coordinate { x, y } => tracing::info!(x, y, "acting at"),
                LoopEvent::IterationStarted { iteration, .. } => {
                    tracing::debug!(iteration, "iteration")
                }
                LoopEvent::Decision {
                    iteration,
                    action,
                    status,
                } => tracing::info!(iteration, action = %action, status = %status, "decision"),
                LoopEvent::Terminated { reason, .. } => {
                    tracing::info!(reason = ?reason, "run terminated")
                }
            }
        }
    });

    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, stopping after the current iteration");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    if let Err(e) = runner.start_task(cli.task, cli.max_iterations, events) {
        tracing::error!(error = %e, "could not start task");
        std::process::exit(1);
    }

    let outcome = runner.wait().await;
    // The worker dropped the last sender; drain what is left.
    let _ = listener.await;

    match outcome {
        Some(outcome) => {
            println!("{}", outcome.message());
            if outcome.terminal == TerminalState::Error {
                std::process::exit(1);
            }
        }
        None => std::process::exit(1),
    }
}
