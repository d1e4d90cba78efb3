//! Explicit state transitions for a run.
//!
//! Each step returns a typed update and [`reduce`] folds it into the
//! [`RunState`]. Merge rules per field:
//!
//! | field                    | maker        | checker          | cancelled      |
//! |--------------------------|--------------|------------------|----------------|
//! | `current_iteration`      | overwrite    | -                | -              |
//! | `current_output`         | overwrite    | -                | -              |
//! | `pending_feedback`       | -            | overwrite        | -              |
//! | `generation_task_handle` | set once     | -                | -              |
//! | `last_output_fingerprint`| overwrite    | -                | -              |
//! | `history`                | append       | merge by number  | -              |
//! | `should_stop`/`success`  | -            | from decision    | true / false   |
//! | `final_artifact`         | -            | output if stop   | current output |

use chrono::{DateTime, Utc};
use checkloop_common::{IterationRecord, OutputArtifact, RunState, Verdict};

use super::decision::Decision;
use crate::errors::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, PartialEq)]
pub struct MakerUpdate {
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub output: OutputArtifact,
    pub handle: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckerUpdate {
    pub iteration: u32,
    pub verdict: Verdict,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
    /// Text for the next maker call; `None` when the check passed.
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Made(MakerUpdate),
    Checked {
        update: CheckerUpdate,
        decision: Decision,
    },
    Cancelled,
}

/// Fold one step result into the run state.
pub fn reduce(mut state: RunState, output: StepOutput) -> WorkflowResult<RunState> {
    match output {
        StepOutput::Made(update) => {
            let expected = state.current_iteration + 1;
            if update.iteration != expected {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "maker produced iteration {} but iteration {} was expected",
                    update.iteration, expected
                )));
            }
            if state.record(update.iteration).is_some() {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "iteration {} is already recorded",
                    update.iteration
                )));
            }
            state.current_iteration = update.iteration;
            state.current_output = Some(update.output.clone());
            if state.generation_task_handle.is_none() {
                state.generation_task_handle = Some(update.handle);
            }
            state.last_output_fingerprint = Some(update.fingerprint);
            state.history.push(IterationRecord {
                iteration: update.iteration,
                started_at: update.started_at,
                completed_at: None,
                maker_duration_ms: update.duration_ms,
                checker_duration_ms: 0,
                output: update.output,
                verdict: None,
            });
        }
        StepOutput::Checked { update, decision } => {
            let record = state
                .history
                .iter_mut()
                .find(|r| r.iteration == update.iteration)
                .ok_or_else(|| {
                    WorkflowError::PreconditionFailed(format!(
                        "no maker record for iteration {}",
                        update.iteration
                    ))
                })?;
            if record.is_checked() {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "iteration {} was already checked",
                    update.iteration
                )));
            }
            record.verdict = Some(update.verdict);
            record.checker_duration_ms = update.duration_ms;
            record.completed_at = Some(update.completed_at);

            state.pending_feedback = update.feedback;
            state.should_stop = decision.should_stop;
            state.success = decision.success;
            if decision.should_stop {
                state.final_artifact = state.current_output.clone();
            }
        }
        StepOutput::Cancelled => {
            state.should_stop = true;
            state.success = false;
            state.final_artifact = state.current_output.clone();
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkloop_common::Artifact;

    fn made(iteration: u32, handle: &str) -> StepOutput {
        StepOutput::Made(MakerUpdate {
            iteration,
            started_at: Utc::now(),
            duration_ms: 100,
            output: OutputArtifact::new(Artifact::new(
                format!("deck-{}.pptx", iteration),
                format!("https://g/deck-{}.pptx", iteration),
            )),
            handle: handle.into(),
            fingerprint: format!("fp-{}", iteration),
        })
    }

    fn checked(iteration: u32, passed: bool, decision: Decision) -> StepOutput {
        StepOutput::Checked {
            update: CheckerUpdate {
                iteration,
                verdict: Verdict {
                    passed,
                    confidence: 0.5,
                    feedback: "fb".into(),
                    issues: vec![],
                },
                duration_ms: 50,
                completed_at: Utc::now(),
                feedback: if passed { None } else { Some("fb".into()) },
            },
            decision,
        }
    }

    const STOP_OK: Decision = Decision {
        should_stop: true,
        success: true,
    };

    #[test]
    fn test_maker_then_checker_merges_one_record() {
        let state = reduce(RunState::new("r1"), made(1, "task-1")).unwrap();
        assert_eq!(state.current_iteration, 1);
        assert_eq!(state.history.len(), 1);
        assert!(!state.history[0].is_checked());

        let state = reduce(state, checked(1, false, Decision::CONTINUE)).unwrap();
        assert_eq!(state.history.len(), 1);
        assert!(state.history[0].is_checked());
        assert_eq!(state.history[0].checker_duration_ms, 50);
        assert_eq!(state.pending_feedback.as_deref(), Some("fb"));
        assert!(!state.should_stop);
        assert!(state.final_artifact.is_none());
    }

    #[test]
    fn test_first_handle_is_kept() {
        let state = reduce(RunState::new("r1"), made(1, "task-1")).unwrap();
        let state = reduce(state, checked(1, false, Decision::CONTINUE)).unwrap();
        let state = reduce(state, made(2, "task-other")).unwrap();
        assert_eq!(state.generation_task_handle.as_deref(), Some("task-1"));
        assert_eq!(state.last_output_fingerprint.as_deref(), Some("fp-2"));
    }

    #[test]
    fn test_stop_sets_final_artifact() {
        let state = reduce(RunState::new("r1"), made(1, "t")).unwrap();
        let state = reduce(state, checked(1, true, STOP_OK)).unwrap();
        assert!(state.should_stop && state.success);
        assert_eq!(state.final_artifact, state.current_output);
        assert!(state.pending_feedback.is_none());
    }

    #[test]
    fn test_checker_without_maker_record_fails() {
        let err = reduce(RunState::new("r1"), checked(1, true, STOP_OK)).unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
    }

    #[test]
    fn test_double_check_is_rejected() {
        let state = reduce(RunState::new("r1"), made(1, "t")).unwrap();
        let state = reduce(state, checked(1, false, Decision::CONTINUE)).unwrap();
        assert!(reduce(state, checked(1, false, Decision::CONTINUE)).is_err());
    }

    #[test]
    fn test_out_of_order_maker_is_rejected() {
        let err = reduce(RunState::new("r1"), made(2, "t")).unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
    }

    #[test]
    fn test_cancel_preserves_partial_output() {
        let state = reduce(RunState::new("r1"), made(1, "t")).unwrap();
        let state = reduce(state, checked(1, false, Decision::CONTINUE)).unwrap();
        let state = reduce(state, StepOutput::Cancelled).unwrap();
        assert!(state.should_stop);
        assert!(!state.success);
        assert_eq!(state.final_artifact.unwrap().artifact.name, "deck-1.pptx");
    }

    #[test]
    fn test_cancel_before_any_output() {
        let state = reduce(RunState::new("r1"), StepOutput::Cancelled).unwrap();
        assert!(state.should_stop);
        assert!(state.final_artifact.is_none());
    }
}
