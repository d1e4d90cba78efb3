use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::RunRequest;

/// Lifecycle of a run as recorded in the run registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Stopped,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry shared between the control plane and the engine.
///
/// The control plane only ever writes `should_stop`; everything else is owned
/// by whoever drives the engine for this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub request: RunRequest,
    pub status: RunStatus,
    pub should_stop: bool,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, request: RunRequest) -> Self {
        Self {
            run_id: run_id.into(),
            request,
            status: RunStatus::Running,
            should_stop: false,
            created_at: Utc::now(),
        }
    }
}
