use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent_engine::event_bus::{EventBus, LoopEvent};
use crate::agent_engine::history::{DecisionHistory, SessionTranscript, TranscriptEntry};
use crate::agent_engine::loop_control::{FailureBudget, StallDetector};
use crate::agent_engine::state::{
    ActionDescriptor, AgentState, Completion, LoopOutcome, TerminalState, CANCELLED_STATUS,
    INITIAL_STATUS,
};
use crate::config::AppConfig;
use crate::errors::PilotResult;
use crate::executor::dispatcher::{ActionExecutor, ExecutionReport};
use crate::llm::client::{build_user_content, DecisionClient, DecisionOutcome};
use crate::perception::annotator;
use crate::perception::traits::ScreenCapture;
use crate::perception::types::CaptureResult;

/// Everything a run needs from its host, injected at construction.
pub struct LoopContext {
    pub config: AppConfig,
    /// Set by the host to stop the loop; polled at the top of each iteration.
    pub cancel: Arc<AtomicBool>,
    pub events: EventBus,
}

/// Per-run mutable state. Created by [`LoopController::run`], dropped when it returns.
struct RunState {
    history: DecisionHistory,
    stall: StallDetector,
    budget: FailureBudget,
    status: String,
    errors: Vec<String>,
    last_executed: Option<String>,
    transcript: Option<SessionTranscript>,
}

enum Step {
    Continue,
    /// No decision came back; nothing was attempted.
    Skipped,
    Finished(TerminalState),
}

/// The perception-decision-action loop.
pub struct LoopController {
    ctx: LoopContext,
    capture: Box<dyn ScreenCapture>,
    client: DecisionClient,
    executor: ActionExecutor,
    state: AgentState,
}

impl LoopController {
    pub fn new(
        ctx: LoopContext,
        capture: Box<dyn ScreenCapture>,
        client: DecisionClient,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            ctx,
            capture,
            client,
            executor,
            state: AgentState::Running { iteration: 0 },
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Drive the loop until a terminal state. Never fails: every error is
    /// either absorbed or reflected in the returned outcome.
    pub async fn run(&mut self, task: &str, max_iterations: Option<u32>) -> LoopOutcome {
        let cap = self.ctx.config.execution.iteration_cap(max_iterations);
        let task = with_time_prefix(task);
        tracing::info!(cap, task = %task, "control loop started");

        let label_dir = self.ctx.config.screenshot.output_path.clone();
        if let Err(e) = annotator::clear_labels(&label_dir) {
            tracing::warn!(dir = %label_dir.display(), "could not clear overlays: {e}");
        }

        let session = &self.ctx.config.session;
        let transcript = session
            .transcript
            .then(|| SessionTranscript::new(session.dir.as_deref()));
        if let Some(t) = &transcript {
            tracing::info!(session = %t.session_id, path = %t.path().display(), "session transcript");
        }

        let mut run = RunState {
            history: DecisionHistory::new(),
            stall: StallDetector::new(),
            budget: FailureBudget::new(self.ctx.config.execution.max_consecutive_failures),
            status: INITIAL_STATUS.to_string(),
            errors: Vec::new(),
            last_executed: None,
            transcript,
        };

        let mut iterations = 0;
        let mut terminal = TerminalState::MaxIterations;

        for i in 0..cap {
            if self.ctx.cancel.load(Ordering::SeqCst) {
                tracing::info!(iteration = i, "cancellation requested");
                run.status = CANCELLED_STATUS.to_string();
                terminal = TerminalState::Cancelled;
                break;
            }

            iterations = i + 1;
            self.state = AgentState::Running { iteration: i };
            self.ctx.events.emit(LoopEvent::IterationStarted {
                iteration: i,
                timestamp: chrono::Utc::now(),
            });
            tracing::info!(iteration = i, "iteration started");
            let started = std::time::Instant::now();

            let step = self.iterate(i, &task, &mut run).await;
            tracing::debug!(
                iteration = i,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "iteration finished"
            );

            match step {
                Ok(Step::Continue) => run.budget.record_success(),
                Ok(Step::Skipped) => {}
                Ok(Step::Finished(reason)) => {
                    terminal = reason;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(iteration = i, "fatal: {e}");
                    run.errors.push(format!("iteration {i}: {e}"));
                    terminal = TerminalState::Error;
                    break;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(iteration = i, "capture failed, skipping iteration: {e}");
                }
                Err(e) if e.is_malformed_response() => {
                    tracing::warn!(iteration = i, "no usable action this iteration: {e}");
                    self.record(&run, i, None, None, Some(e.to_string()));
                }
                Err(e) => {
                    tracing::error!(iteration = i, "iteration failed: {e}");
                    run.errors.push(format!("iteration {i}: {e}"));
                    self.record(&run, i, None, None, Some(e.to_string()));
                    if run.budget.record_failure() {
                        tracing::error!(
                            failures = run.budget.consecutive(),
                            "consecutive failure budget exhausted"
                        );
                        terminal = TerminalState::Error;
                        break;
                    }
                }
            }
        }

        let outcome = LoopOutcome {
            terminal,
            status: run.status,
            errors: run.errors,
            iterations,
        };
        self.state = AgentState::Terminated { reason: terminal };
        self.ctx.events.emit(LoopEvent::Terminated {
            reason: terminal,
            message: outcome.message(),
        });
        tracing::info!(
            reason = ?terminal,
            iterations,
            errors = outcome.errors.len(),
            status = %outcome.status,
            "control loop finished"
        );
        outcome
    }

    async fn iterate(&mut self, i: u32, task: &str, run: &mut RunState) -> PilotResult<Step> {
        let capture = self.capture.capture()?;

        let history = run.history.render();
        let user_content = build_user_content(&history, run.last_executed.as_deref(), task);

        let descriptor = match self.client.decide(&capture, user_content).await? {
            DecisionOutcome::Action(d) => d,
            DecisionOutcome::Skipped(reason) => {
                tracing::warn!(iteration = i, reason = %reason, "no decision this iteration");
                return Ok(Step::Skipped);
            }
        };

        run.status = descriptor.status.clone();
        self.ctx.events.emit(LoopEvent::Decision {
            iteration: i,
            action: descriptor.action,
            status: descriptor.status.clone(),
        });
        tracing::info!(
            iteration = i,
            action = %descriptor.action,
            target = %descriptor.target_description,
            completion = ?descriptor.completion,
            status = %descriptor.status,
            "decision received"
        );

        match descriptor.completion {
            Completion::Completed => {
                self.record(run, i, Some(&descriptor), None, None);
                return Ok(Step::Finished(TerminalState::Complete));
            }
            Completion::Blocked => {
                self.record(run, i, Some(&descriptor), None, None);
                return Ok(Step::Finished(TerminalState::Blocked));
            }
            Completion::InProgress => {}
        }

        if run.stall.observe(descriptor.coordinates) {
            run.history.clear();
        }

        let report = self
            .executor
            .execute(&descriptor, &capture, &self.ctx.events)
            .await?;

        self.write_overlay(i, &capture, &report);
        self.record(run, i, Some(&descriptor), Some(&report.summary), None);

        run.last_executed = Some(report.summary);
        run.history.push(descriptor);
        Ok(Step::Continue)
    }

    fn write_overlay(&self, i: u32, capture: &CaptureResult, report: &ExecutionReport) {
        if report.mapped.is_empty() || capture.png_bytes.is_empty() {
            return;
        }
        let points: Vec<(i64, i64)> = report
            .mapped
            .iter()
            .map(|p| p.to_image(capture.scale))
            .collect();
        let path = annotator::label_path(&self.ctx.config.screenshot.output_path, i);
        if let Err(e) = annotator::mark_coordinates(&capture.png_bytes, &points, &path) {
            tracing::warn!(iteration = i, path = %path.display(), "overlay failed: {e}");
        }
    }

    fn record(
        &self,
        run: &RunState,
        iteration: u32,
        decision: Option<&ActionDescriptor>,
        executed: Option<&str>,
        error: Option<String>,
    ) {
        let Some(transcript) = &run.transcript else {
            return;
        };
        let entry = TranscriptEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            iteration,
            decision: decision
                .map(ActionDescriptor::to_wire)
                .unwrap_or(serde_json::Value::Null),
            executed: executed.map(str::to_string),
            error,
        };
        if let Err(e) = transcript.append(&entry) {
            tracing::warn!("transcript write failed: {e}");
        }
    }
}

/// Prefix the task with the local wall-clock time.
pub fn with_time_prefix(task: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M");
    format!("Current time: {now}\nUser task: {task}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_prefix_layout() {
        let text = with_time_prefix("open the calculator");
        let (first, second) = text.split_once('\n').unwrap();
        assert!(first.starts_with("Current time: "));
        // "YYYY-MM-DD HH:MM"
        assert_eq!(first.len(), "Current time: ".len() + 16);
        assert_eq!(second, "User task: open the calculator");
    }
}
