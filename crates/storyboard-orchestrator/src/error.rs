//! Error types for batch orchestration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use storyboard_artifact::DownloadError;
use storyboard_client::ClientError;
use storyboard_config::StoryError;
use storyboard_workflow::WorkflowError;
use thiserror::Error;

/// Pipeline stage a prompt failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Patch,
  Submit,
  Wait,
  History,
  Download,
}

/// Failure of one prompt's pipeline.
#[derive(Debug, Error)]
pub enum JobError {
  #[error("patching the workflow failed: {0}")]
  Patch(#[from] WorkflowError),

  #[error("submission failed: {0}")]
  Submit(#[source] ClientError),

  #[error("waiting for prompt '{prompt_id}' failed: {source}")]
  Wait {
    prompt_id: String,
    #[source]
    source: ClientError,
  },

  #[error("prompt '{prompt_id}' failed on the service: {message}")]
  ExecutionFailed { prompt_id: String, message: String },

  #[error("fetching history of prompt '{prompt_id}' failed: {source}")]
  History {
    prompt_id: String,
    #[source]
    source: ClientError,
  },

  #[error("downloading artifacts of prompt '{prompt_id}' failed: {source}")]
  Download {
    prompt_id: String,
    #[source]
    source: DownloadError,
  },
}

impl JobError {
  pub fn stage(&self) -> Stage {
    match self {
      Self::Patch(_) => Stage::Patch,
      Self::Submit(_) => Stage::Submit,
      Self::Wait { .. } | Self::ExecutionFailed { .. } => Stage::Wait,
      Self::History { .. } => Stage::History,
      Self::Download { .. } => Stage::Download,
    }
  }

  /// Service-issued id, when the failure happened after submission.
  pub fn prompt_id(&self) -> Option<&str> {
    match self {
      Self::Patch(_) | Self::Submit(_) => None,
      Self::Wait { prompt_id, .. }
      | Self::ExecutionFailed { prompt_id, .. }
      | Self::History { prompt_id, .. }
      | Self::Download { prompt_id, .. } => Some(prompt_id),
    }
  }
}

/// Why the validation run did not pass.
#[derive(Debug, Error)]
pub enum ValidationFailure {
  #[error(transparent)]
  Job(#[from] JobError),

  #[error("the job finished without producing any artifact")]
  NoArtifacts,

  #[error("{failed} of {total} artifacts could not be downloaded")]
  IncompleteDownload { failed: usize, total: usize },
}

/// Errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error(transparent)]
  Stories(#[from] StoryError),

  #[error("no image prompts found in {}", .path.display())]
  NoPrompts { path: PathBuf },

  #[error("validation run for prompt '{prompt}' failed: {reason}")]
  ValidationRun {
    prompt: String,
    output_dir: PathBuf,
    #[source]
    reason: ValidationFailure,
  },
}
