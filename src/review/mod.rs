//! ReviewClient: submits the maker's output to a judge service and parses
//! its verdict.

pub mod client;
pub mod parse;

use async_trait::async_trait;
use checkloop_common::{Artifact, Verdict};

use crate::errors::WorkflowResult;

pub use client::{ChatReviewClient, ReviewSettings};
pub use parse::{NO_FEEDBACK, parse_verdict};

/// One checker call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub prompt: String,
    pub primary: Artifact,
    /// Supporting context. Duplicates are removed before sending.
    pub references: Vec<Artifact>,
}

#[async_trait]
pub trait ReviewClient: Send + Sync {
    async fn review(&self, request: ReviewRequest) -> WorkflowResult<Verdict>;
}
