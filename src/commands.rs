// Host-facing operations: start a run, stop it, reload configuration between runs.
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::agent_engine::engine::{LoopContext, LoopController};
use crate::agent_engine::event_bus::EventBus;
use crate::agent_engine::state::{LoopOutcome, TerminalState, INITIAL_STATUS};
use crate::config::{self, AppConfig};
use crate::errors::{PilotError, PilotResult};
use crate::executor::dispatcher::ActionExecutor;
use crate::executor::input::EnigoDevice;
use crate::llm::client::DecisionClient;
use crate::llm::prompt::load_system_prompt;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::perception::screenshot::XcapCapture;

/// Owns the configuration, the cancellation flag and the worker thread of
/// at most one run.
pub struct TaskRunner {
    config: AppConfig,
    config_path: Option<PathBuf>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<LoopOutcome>>,
}

impl TaskRunner {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared flag; storing `true` stops the run at its next iteration.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start a run on a dedicated worker thread.
    ///
    /// The capture, input and transport backends are built on that thread,
    /// so none of them has to be `Send`.
    pub fn start_task(
        &mut self,
        task: String,
        max_iterations: Option<u32>,
        events: EventBus,
    ) -> PilotResult<()> {
        if self.is_running() {
            return Err(PilotError::Executor("a task is already running".into()));
        }
        self.cancel.store(false, Ordering::SeqCst);

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let handle = std::thread::Builder::new()
            .name("visionpilot-loop".into())
            .spawn(move || run_on_worker(config, cancel, events, task, max_iterations))?;

        self.worker = Some(handle);
        tracing::info!("task started");
        Ok(())
    }

    /// Request cooperative cancellation. In-flight calls are not interrupted.
    pub fn stop_task(&self) {
        tracing::info!("stop requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Re-read the configuration file. Rejected while a run is active.
    pub fn reload_config(&mut self) -> PilotResult<()> {
        if self.is_running() {
            return Err(PilotError::Config(
                "cannot reload configuration while a task is running".into(),
            ));
        }
        self.config = config::load_config_or_default(self.config_path.as_deref())?;
        Ok(())
    }

    /// Store a credential entered at runtime and persist it.
    pub fn save_api_key(&mut self, api_key: String) -> PilotResult<()> {
        self.config.api.api_key = api_key;
        match &self.config_path {
            Some(path) => config::save_config_to(&self.config, path),
            None => config::save_config(&self.config),
        }
    }

    /// Wait for the current run without blocking the async runtime.
    pub async fn wait(&mut self) -> Option<LoopOutcome> {
        let handle = self.worker.take()?;
        let joined = tokio::task::spawn_blocking(move || handle.join()).await;
        Some(match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => failed_outcome("control loop worker panicked".into()),
            Err(e) => failed_outcome(format!("control loop worker lost: {e}")),
        })
    }
}

fn run_on_worker(
    config: AppConfig,
    cancel: Arc<AtomicBool>,
    events: EventBus,
    task: String,
    max_iterations: Option<u32>,
) -> LoopOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return failed_outcome(format!("runtime: {e}")),
    };

    let mut controller = match build_controller(config, cancel, events) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("could not start control loop: {e}");
            return failed_outcome(e.to_string());
        }
    };
    runtime.block_on(controller.run(&task, max_iterations))
}

/// Wire the real backends into a controller.
pub fn build_controller(
    config: AppConfig,
    cancel: Arc<AtomicBool>,
    events: EventBus,
) -> PilotResult<LoopController> {
    let capture = XcapCapture::new(config.screenshot.clone());
    let transport = Arc::new(OpenAiCompatibleProvider::from_config(&config.api, &config.ai)?);
    let prompt = load_system_prompt(&config.prompts)?;
    let client = DecisionClient::new(transport, prompt, config.api.has_credential());
    let device = EnigoDevice::new()?;
    let executor = ActionExecutor::new(
        Box::new(device),
        config.mouse.clone(),
        config.delays.clone(),
    );

    Ok(LoopController::new(
        LoopContext {
            config,
            cancel,
            events,
        },
        Box::new(capture),
        client,
        executor,
    ))
}

fn failed_outcome(error: String) -> LoopOutcome {
    LoopOutcome {
        terminal: TerminalState::Error,
        status: INITIAL_STATUS.to_string(),
        errors: vec![error],
        iterations: 0,
    }
}
