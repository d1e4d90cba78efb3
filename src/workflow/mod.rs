//! Workflow orchestration: the maker-checker loop.
//!
//! - `controller`: one maker or checker call as an [`IterationSteps`] unit
//! - `reducer`: pure `(state, step output) -> state` transitions
//! - `decision`: the stop/continue rule
//! - `engine`: [`MakerCheckerEngine`], sequencing steps and emitting events
//! - `scripted`: deterministic steps for local development
//! - `events`: event sinks and cancellation checks
//! - `prompts`: maker and checker prompt policy

pub mod controller;
pub mod decision;
pub mod engine;
pub mod events;
pub mod prompts;
pub mod reducer;
pub mod scripted;

pub use controller::{IterationController, IterationSteps};
pub use decision::{Decision, decide};
pub use engine::{MakerCheckerEngine, RunOutcome, WorkflowEngine};
pub use events::{CancellationCheck, ChannelSink, EventSink, NeverCancel, NoopSink, RecordingSink};
pub use reducer::{CheckerUpdate, MakerUpdate, StepOutput, reduce};
pub use scripted::ScriptedSteps;
