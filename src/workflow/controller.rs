//! Single-iteration units of work: one maker call, one checker call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use checkloop_common::{Artifact, RunRequest, RunState, dedupe_by_identity};
use tracing::{debug, info};

use super::prompts::{feedback_for, maker_prompt, review_prompt};
use super::reducer::{CheckerUpdate, MakerUpdate};
use crate::collab::PreviewRenderer;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::generation::{GenerationClient, GenerationRequest};
use crate::review::{ReviewClient, ReviewRequest};

/// The two steps the engine alternates between.
///
/// Implementations read the current state and return an update; they never
/// mutate the state themselves.
#[async_trait]
pub trait IterationSteps: Send + Sync {
    async fn make(&self, request: &RunRequest, state: &RunState) -> WorkflowResult<MakerUpdate>;

    async fn check(&self, request: &RunRequest, state: &RunState) -> WorkflowResult<CheckerUpdate>;
}

/// All input and reference files, de-duplicated, inputs first.
pub fn supporting_artifacts(request: &RunRequest) -> Vec<Artifact> {
    dedupe_by_identity(request.inputs.iter().chain(&request.references).cloned())
}

/// Live steps backed by the generation and review services.
pub struct IterationController {
    generator: Arc<dyn GenerationClient>,
    reviewer: Arc<dyn ReviewClient>,
    previews: Arc<PreviewRenderer>,
}

impl IterationController {
    pub fn new(
        generator: Arc<dyn GenerationClient>,
        reviewer: Arc<dyn ReviewClient>,
        previews: Arc<PreviewRenderer>,
    ) -> Self {
        Self {
            generator,
            reviewer,
            previews,
        }
    }
}

#[async_trait]
impl IterationSteps for IterationController {
    async fn make(&self, request: &RunRequest, state: &RunState) -> WorkflowResult<MakerUpdate> {
        let iteration = state.current_iteration + 1;
        let supporting = supporting_artifacts(request);
        let input_names = supporting.iter().map(|a| a.name.clone()).collect();
        // later iterations rely on the continued task's context
        let attachments = if iteration == 1 { supporting } else { Vec::new() };

        let started_at = Utc::now();
        let clock = Instant::now();
        let generated = self
            .generator
            .generate(GenerationRequest {
                prompt: maker_prompt(request, iteration, state.pending_feedback.as_deref()),
                attachments,
                input_names,
                continuation_handle: state.generation_task_handle.clone(),
                previous_fingerprint: state.last_output_fingerprint.clone(),
            })
            .await?;
        let output = self
            .previews
            .render(&state.run_id, iteration, generated.artifact)
            .await;
        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(iteration, artifact = %output.artifact.name, duration_ms, "Maker step complete");

        Ok(MakerUpdate {
            iteration,
            started_at,
            duration_ms,
            output,
            handle: generated.handle,
            fingerprint: generated.fingerprint,
        })
    }

    async fn check(&self, request: &RunRequest, state: &RunState) -> WorkflowResult<CheckerUpdate> {
        let output = state.current_output.as_ref().ok_or_else(|| {
            WorkflowError::PreconditionFailed("checker invoked before any output exists".to_string())
        })?;
        let iteration = state.current_iteration;
        let prompt = review_prompt(request, iteration, state.pending_feedback.as_deref());

        let clock = Instant::now();
        let verdict = self
            .reviewer
            .review(ReviewRequest {
                prompt,
                primary: output.review_target().clone(),
                references: supporting_artifacts(request),
            })
            .await?;
        let duration_ms = clock.elapsed().as_millis() as u64;
        debug!(iteration, passed = verdict.passed, confidence = verdict.confidence, "Checker step complete");

        Ok(CheckerUpdate {
            iteration,
            feedback: feedback_for(&verdict),
            verdict,
            duration_ms,
            completed_at: Utc::now(),
        })
    }
}
