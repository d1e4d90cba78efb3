//! GenerationClient: the maker's view of the task-based generation service.
//!
//! - `wire`: request and response payloads of the task API
//! - `select`: output fingerprinting and primary-artifact disambiguation
//! - `client`: [`HttpGenerationClient`], task creation/continuation and polling

pub mod client;
pub mod select;
pub mod wire;

use async_trait::async_trait;
use checkloop_common::Artifact;

use crate::errors::WorkflowResult;

pub use client::{HttpGenerationClient, PollSettings};
pub use select::{PathMarkers, fingerprint, select_primary};

/// One maker call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Files sent with this call. Empty on continued tasks.
    pub attachments: Vec<Artifact>,
    /// Names of every file the caller ever supplied to the task, used to tell
    /// echoed inputs apart from fresh outputs.
    pub input_names: Vec<String>,
    pub continuation_handle: Option<String>,
    pub previous_fingerprint: Option<String>,
}

/// Result of one maker call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub artifact: Artifact,
    /// Task to continue on the next iteration.
    pub handle: String,
    pub fingerprint: String,
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> WorkflowResult<GenerationOutput>;
}
