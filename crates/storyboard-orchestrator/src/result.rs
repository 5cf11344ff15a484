//! Batch results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use storyboard_artifact::ArtifactFailure;

use crate::error::{JobError, Stage};
use crate::orchestrator::JobOutput;

/// Outcome of one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOutcome {
  /// Position of the prompt in the flattened prompt list, starting at 0.
  pub index: usize,
  pub prompt: String,
  pub output_dir: PathBuf,
  /// Whether this was the gating validation run.
  pub validation_run: bool,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prompt_id: Option<String>,
  #[serde(default)]
  pub downloaded_files: Vec<PathBuf>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub failed_artifacts: Vec<ArtifactFailure>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stage: Option<Stage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl PromptOutcome {
  pub(crate) fn completed(
    index: usize,
    prompt: &str,
    output_dir: PathBuf,
    validation_run: bool,
    output: JobOutput,
  ) -> Self {
    let success = output.report.is_complete();
    Self {
      index,
      prompt: prompt.to_string(),
      output_dir,
      validation_run,
      success,
      prompt_id: Some(output.prompt_id),
      downloaded_files: output.report.saved,
      stage: (!success).then_some(Stage::Download),
      error: (!success).then(|| {
        format!(
          "{} artifact(s) could not be downloaded",
          output.report.failures.len()
        )
      }),
      failed_artifacts: output.report.failures,
    }
  }

  pub(crate) fn failed(index: usize, prompt: &str, output_dir: PathBuf, error: &JobError) -> Self {
    Self {
      index,
      prompt: prompt.to_string(),
      output_dir,
      validation_run: false,
      success: false,
      prompt_id: error.prompt_id().map(str::to_string),
      downloaded_files: Vec::new(),
      failed_artifacts: Vec::new(),
      stage: Some(error.stage()),
      error: Some(error.to_string()),
    }
  }
}

/// Per-prompt outcomes of a batch, in prompt order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
  pub entries: Vec<PromptOutcome>,
  /// Set when the batch stopped early on request.
  pub cancelled: bool,
  /// Story files that were ignored because they could not be parsed.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub skipped_files: Vec<PathBuf>,
}

impl BatchResult {
  pub fn succeeded(&self) -> usize {
    self.entries.iter().filter(|e| e.success).count()
  }

  pub fn failed(&self) -> usize {
    self.entries.len() - self.succeeded()
  }

  pub fn is_success(&self) -> bool {
    !self.cancelled && self.entries.iter().all(|e| e.success)
  }
}
