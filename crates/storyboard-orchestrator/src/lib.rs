//! Batch orchestration for storyboard.
//!
//! [`BatchOrchestrator`] drives the pipeline for every prompt extracted from
//! a directory of story files:
//!
//! patch -> submit -> wait -> fetch history -> download
//!
//! The first prompt is a validation run written to `output_root/test`. If it
//! fails at any stage the batch stops before any further submission. The
//! remaining prompts run one after another into `output_root/story_<n>`; a
//! failure there is recorded in the [`BatchResult`] and the batch moves on.

mod error;
mod orchestrator;
mod result;

pub use error::{BatchError, JobError, Stage, ValidationFailure};
pub use orchestrator::{BatchOrchestrator, BatchRequest, JobOutput, OrchestratorConfig, PatchTarget};
pub use result::{BatchResult, PromptOutcome};
