//! Deterministic steps for local development.
//!
//! Produces placeholder drafts in the object store and a verdict that fails
//! until `pass_on_iteration`, so a UI can exercise the full event sequence
//! without any upstream services.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use checkloop_common::{Artifact, OutputArtifact, RunRequest, RunState, Verdict};
use tracing::debug;

use super::controller::IterationSteps;
use super::prompts::{feedback_for, maker_prompt};
use super::reducer::{CheckerUpdate, MakerUpdate};
use crate::collab::ObjectStore;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::generation::fingerprint;

pub struct ScriptedSteps {
    store: Arc<dyn ObjectStore>,
    delay: Duration,
    pass_on_iteration: u32,
    ttl: Duration,
}

impl ScriptedSteps {
    pub fn new(store: Arc<dyn ObjectStore>, delay: Duration, pass_on_iteration: u32, ttl: Duration) -> Self {
        Self {
            store,
            delay,
            pass_on_iteration,
            ttl,
        }
    }
}

#[async_trait]
impl IterationSteps for ScriptedSteps {
    async fn make(&self, request: &RunRequest, state: &RunState) -> WorkflowResult<MakerUpdate> {
        let iteration = state.current_iteration + 1;
        let started_at = Utc::now();
        let clock = Instant::now();
        tokio::time::sleep(self.delay).await;

        let prompt = maker_prompt(request, iteration, state.pending_feedback.as_deref());
        let body = format!("Draft {} for run {}\n\n{}\n", iteration, state.run_id, prompt);
        let name = format!("draft-{}.txt", iteration);
        let path = format!("runs/{}/iter-{}/{}", state.run_id, iteration, name);
        let size = body.len() as u64;
        let url = self
            .store
            .put(body.into_bytes(), &path, "text/plain", self.ttl)
            .await?;
        debug!(iteration, %url, "Scripted draft stored");

        let artifact = Artifact::new(name, url.clone())
            .with_id(format!("{}-draft-{}", state.run_id, iteration))
            .with_mime_type("text/plain")
            .with_size(size);
        Ok(MakerUpdate {
            iteration,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            output: OutputArtifact::new(artifact),
            handle: format!("scripted-{}", state.run_id),
            fingerprint: fingerprint([url.as_str()]),
        })
    }

    async fn check(&self, _request: &RunRequest, state: &RunState) -> WorkflowResult<CheckerUpdate> {
        if state.current_output.is_none() {
            return Err(WorkflowError::PreconditionFailed(
                "checker invoked before any output exists".to_string(),
            ));
        }
        let clock = Instant::now();
        tokio::time::sleep(self.delay).await;

        let iteration = state.current_iteration;
        let verdict = if iteration >= self.pass_on_iteration {
            Verdict {
                passed: true,
                confidence: 0.92,
                feedback: "The draft meets every criterion.".to_string(),
                issues: vec![],
            }
        } else {
            Verdict {
                passed: false,
                confidence: 0.45,
                feedback: format!("Draft {} is a good start but needs another pass.", iteration),
                issues: vec![
                    "Tighten the opening section".to_string(),
                    "Cite a source for every claim".to_string(),
                ],
            }
        };
        Ok(CheckerUpdate {
            iteration,
            feedback: feedback_for(&verdict),
            verdict,
            duration_ms: clock.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MemoryObjectStore;
    use crate::workflow::engine::{MakerCheckerEngine, WorkflowEngine};
    use crate::workflow::events::{NeverCancel, RecordingSink};
    use checkloop_common::{RunConfig, RunStatus, WorkflowEvent};

    fn request() -> RunRequest {
        RunRequest {
            generation_prompt: "Write a memo".into(),
            review_prompt: "Check tone".into(),
            guidelines: String::new(),
            inputs: vec![],
            references: vec![],
            config: RunConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_scripted_run_passes_on_second_iteration() {
        let store = Arc::new(MemoryObjectStore::new("mem://o"));
        let steps = ScriptedSteps::new(store.clone(), Duration::from_millis(1), 2, Duration::from_secs(60));
        let engine = MakerCheckerEngine::new(steps);
        let sink = RecordingSink::new();
        let outcome = engine.run("r1", &request(), &sink, &NeverCancel).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert!(outcome.state.success);
        assert_eq!(outcome.state.history.len(), 2);
        assert_eq!(store.list_by_prefix("runs/r1/").await.unwrap().len(), 2);
        assert!(matches!(
            sink.events().last(),
            Some(WorkflowEvent::WorkflowComplete { success: true, .. })
        ));
    }
}
