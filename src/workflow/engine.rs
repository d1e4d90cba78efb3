//! The maker-checker state machine.

use async_trait::async_trait;
use chrono::Utc;
use checkloop_common::{RunRequest, RunState, RunStatus, WorkflowEvent};
use tracing::{Instrument, error, info, info_span};

use super::controller::IterationSteps;
use super::decision::decide;
use super::events::{CancellationCheck, EventSink};
use super::reducer::{StepOutput, reduce};
use crate::errors::WorkflowResult;

/// Terminal result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunState,
    /// `Completed` when the stop rule ended the run, `Stopped` when cancelled.
    pub status: RunStatus,
}

/// Runs one workflow to a terminal state.
///
/// On success the last event emitted is `workflow_complete`; on failure it is
/// `error` and the error is returned as well.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn run(
        &self,
        run_id: &str,
        request: &RunRequest,
        sink: &dyn EventSink,
        cancel: &dyn CancellationCheck,
    ) -> WorkflowResult<RunOutcome>;
}

/// Alternates maker and checker steps until the stop rule or a cancellation
/// ends the run. Iterations are strictly sequential.
pub struct MakerCheckerEngine<S> {
    steps: S,
}

impl<S: IterationSteps> MakerCheckerEngine<S> {
    pub fn new(steps: S) -> Self {
        Self { steps }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        in_progress: &mut u32,
        request: &RunRequest,
        sink: &dyn EventSink,
        cancel: &dyn CancellationCheck,
    ) -> WorkflowResult<RunStatus> {
        loop {
            if cancel.is_cancelled().await {
                info!(iteration = state.current_iteration, "Run cancelled before next maker call");
                *state = reduce(std::mem::take(state), StepOutput::Cancelled)?;
                return Ok(RunStatus::Stopped);
            }

            let iteration = state.current_iteration + 1;
            *in_progress = iteration;
            sink.emit(WorkflowEvent::IterationStart { iteration });

            let made = self.steps.make(request, state).await?;
            *state = reduce(std::mem::take(state), StepOutput::Made(made))?;
            if let Some(output) = state.current_output.as_ref() {
                sink.emit(WorkflowEvent::MakerComplete {
                    iteration,
                    timestamp: Utc::now(),
                    output_artifact_id: output.display_id().to_string(),
                    output_artifact_url: output.artifact.url.clone(),
                    thumbnail_urls: output.thumbnail_urls.clone(),
                });
            }

            let update = self.steps.check(request, state).await?;
            let decision = decide(&update.verdict, state.current_iteration, &request.config);
            let verdict = update.verdict.clone();
            *state = reduce(std::mem::take(state), StepOutput::Checked { update, decision })?;
            info!(
                iteration,
                passed = verdict.passed,
                confidence = verdict.confidence,
                should_stop = decision.should_stop,
                "Iteration checked"
            );
            sink.emit(WorkflowEvent::CheckerComplete {
                iteration,
                passed: verdict.passed,
                confidence: verdict.confidence,
                feedback: verdict.feedback,
                issues: verdict.issues,
            });

            if decision.should_stop {
                return Ok(RunStatus::Completed);
            }
        }
    }
}

#[async_trait]
impl<S: IterationSteps> WorkflowEngine for MakerCheckerEngine<S> {
    async fn run(
        &self,
        run_id: &str,
        request: &RunRequest,
        sink: &dyn EventSink,
        cancel: &dyn CancellationCheck,
    ) -> WorkflowResult<RunOutcome> {
        let span = info_span!("run", run_id = %run_id);
        async move {
            let mut state = RunState::new(run_id);
            let mut in_progress = 0u32;
            match self
                .drive(&mut state, &mut in_progress, request, sink, cancel)
                .await
            {
                Ok(status) => {
                    let final_artifact = state.final_artifact.as_ref();
                    sink.emit(WorkflowEvent::WorkflowComplete {
                        success: state.success,
                        total_iterations: state.history.len() as u32,
                        final_artifact_id: final_artifact.map(|a| a.display_id().to_string()),
                        final_artifact_url: final_artifact.map(|a| a.artifact.url.clone()),
                    });
                    info!(%status, success = state.success, iterations = state.history.len(), "Run finished");
                    Ok(RunOutcome { state, status })
                }
                Err(e) => {
                    error!(iteration = in_progress, error = %e, "Run failed");
                    sink.emit(WorkflowEvent::Error {
                        message: e.to_string(),
                        iteration: in_progress,
                    });
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
