use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::OutputArtifact;
use crate::seq;
use crate::verdict::Verdict;

/// One maker/checker round.
///
/// The maker step creates the record with `verdict: None`; the checker step
/// fills in the verdict for the same iteration number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    /// 1-based, matches the maker call that produced the output.
    pub iteration: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub maker_duration_ms: u64,
    #[serde(default)]
    pub checker_duration_ms: u64,
    pub output: OutputArtifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl IterationRecord {
    pub fn is_checked(&self) -> bool {
        self.verdict.is_some()
    }
}

/// Engine-owned aggregate threaded through every step of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    /// Number of maker calls completed so far.
    pub current_iteration: u32,
    #[serde(default)]
    pub current_output: Option<OutputArtifact>,
    /// Feedback carried from the last checker step into the next maker call.
    #[serde(default)]
    pub pending_feedback: Option<String>,
    /// Upstream task continued across iterations; set once by the first maker call.
    #[serde(default)]
    pub generation_task_handle: Option<String>,
    #[serde(default)]
    pub last_output_fingerprint: Option<String>,
    #[serde(default, deserialize_with = "seq::ordered")]
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub final_artifact: Option<OutputArtifact>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub should_stop: bool,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn record(&self, iteration: u32) -> Option<&IterationRecord> {
        self.history.iter().find(|r| r.iteration == iteration)
    }

    /// Number of iterations that completed both steps.
    pub fn checked_iterations(&self) -> usize {
        self.history.iter().filter(|r| r.is_checked()).count()
    }
}
