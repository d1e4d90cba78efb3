//! Lifecycle events emitted by the workflow engine.
//!
//! Serialized with an internal `type` tag in snake_case and camelCase fields,
//! which is exactly the payload shape pushed to stream observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkflowEvent {
    IterationStart {
        iteration: u32,
    },
    MakerComplete {
        iteration: u32,
        timestamp: DateTime<Utc>,
        output_artifact_id: String,
        output_artifact_url: String,
        thumbnail_urls: Vec<String>,
    },
    CheckerComplete {
        iteration: u32,
        passed: bool,
        confidence: f64,
        feedback: String,
        issues: Vec<String>,
    },
    WorkflowComplete {
        success: bool,
        total_iterations: u32,
        final_artifact_id: Option<String>,
        final_artifact_url: Option<String>,
    },
    Error {
        message: String,
        iteration: u32,
    },
}

impl WorkflowEvent {
    /// Stable event name, identical to the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IterationStart { .. } => "iteration_start",
            Self::MakerComplete { .. } => "maker_complete",
            Self::CheckerComplete { .. } => "checker_complete",
            Self::WorkflowComplete { .. } => "workflow_complete",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WorkflowComplete { .. } | Self::Error { .. })
    }

    /// Iteration number carried by the event, if any.
    pub fn iteration(&self) -> Option<u32> {
        match self {
            Self::IterationStart { iteration }
            | Self::MakerComplete { iteration, .. }
            | Self::CheckerComplete { iteration, .. }
            | Self::Error { iteration, .. } => Some(*iteration),
            Self::WorkflowComplete { .. } => None,
        }
    }
}
