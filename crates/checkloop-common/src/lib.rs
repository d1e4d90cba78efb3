//! Shared domain types for the checkloop orchestrator.
//!
//! Everything here is plain data: the request a caller submits, the state the
//! engine threads through a run, the records it appends, and the events it
//! emits. Behaviour (reducers, decision rules, clients) lives in the main crate.

pub mod artifact;
pub mod event;
pub mod request;
pub mod run;
pub mod seq;
pub mod state;
pub mod verdict;

pub use artifact::{Artifact, OutputArtifact, dedupe_by_identity};
pub use event::WorkflowEvent;
pub use request::{RunConfig, RunRequest};
pub use run::{RunRecord, RunStatus};
pub use state::{IterationRecord, RunState};
pub use verdict::Verdict;
