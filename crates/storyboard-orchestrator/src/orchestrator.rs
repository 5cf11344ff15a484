//! Batch orchestrator implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use storyboard_artifact::{ArtifactDownloader, DownloadPolicy, DownloadReport};
use storyboard_client::{
  Clock, CompletionPoller, ExecutionStatus, HistoryFetcher, JobSubmitter, PollConfig, Session,
  TokioClock,
};
use storyboard_config::{Settings, load_stories};
use storyboard_workflow::{InputPolicy, Workflow};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{BatchError, JobError, ValidationFailure};
use crate::result::{BatchResult, PromptOutcome};

/// The `(node, input)` pair each prompt is written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
  pub node_id: String,
  pub input_name: String,
  pub policy: InputPolicy,
}

impl PatchTarget {
  pub fn new(node_id: impl Into<String>, input_name: impl Into<String>) -> Self {
    Self {
      node_id: node_id.into(),
      input_name: input_name.into(),
      policy: InputPolicy::Strict,
    }
  }

  pub fn with_policy(mut self, policy: InputPolicy) -> Self {
    self.policy = policy;
    self
  }
}

/// Inputs of one batch run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
  pub workflow_path: PathBuf,
  pub stories_dir: PathBuf,
  pub target: PatchTarget,
  pub output_root: PathBuf,
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
  pub poll: PollConfig,
  pub download_policy: DownloadPolicy,
  /// Pause between two bulk prompts.
  pub inter_prompt_delay: Duration,
  /// Stop after the validation run.
  pub validate_only: bool,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      poll: PollConfig::default(),
      download_policy: DownloadPolicy::default(),
      inter_prompt_delay: Duration::from_secs(2),
      validate_only: false,
    }
  }
}

impl OrchestratorConfig {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      poll: PollConfig {
        interval: settings.poll_interval(),
        timeout: settings.poll_timeout(),
        max_errors: settings.max_poll_errors,
        max_missing_polls: settings.max_missing_polls,
      },
      download_policy: if settings.abort_on_download_error {
        DownloadPolicy::AbortJob
      } else {
        DownloadPolicy::SkipAndContinue
      },
      inter_prompt_delay: settings.inter_prompt_delay(),
      validate_only: false,
    }
  }
}

/// What a successful pipeline run produced.
#[derive(Debug, Clone)]
pub struct JobOutput {
  pub prompt_id: String,
  pub report: DownloadReport,
}

/// Drives the prompt pipeline over a batch of story prompts.
///
/// Prompts run strictly one after another: the artifacts of prompt N are on
/// disk before prompt N+1 is submitted.
pub struct BatchOrchestrator {
  session: Session,
  submitter: JobSubmitter,
  poller: CompletionPoller,
  fetcher: HistoryFetcher,
  downloader: ArtifactDownloader,
  clock: Arc<dyn Clock>,
  config: OrchestratorConfig,
}

impl BatchOrchestrator {
  /// Create an orchestrator on wall-clock time.
  pub fn new(session: Session, config: OrchestratorConfig) -> Self {
    Self::with_clock(session, config, Arc::new(TokioClock))
  }

  /// Create an orchestrator whose polling and pacing run on `clock`.
  pub fn with_clock(session: Session, config: OrchestratorConfig, clock: Arc<dyn Clock>) -> Self {
    Self {
      session,
      submitter: JobSubmitter::new(),
      poller: CompletionPoller::with_clock(config.poll.clone(), clock.clone()),
      fetcher: HistoryFetcher::new(),
      downloader: ArtifactDownloader::new(config.download_policy),
      clock,
      config,
    }
  }

  /// Run a batch to completion.
  pub async fn run(&self, request: &BatchRequest) -> Result<BatchResult, BatchError> {
    self.run_with_cancel(request, &CancellationToken::new()).await
  }

  /// Run a batch, stopping between prompts once `cancel` fires.
  #[instrument(
    name = "batch_run",
    skip(self, request, cancel),
    fields(
      workflow = %request.workflow_path.display(),
      stories = %request.stories_dir.display(),
      client_id = %self.session.client_id(),
    )
  )]
  pub async fn run_with_cancel(
    &self,
    request: &BatchRequest,
    cancel: &CancellationToken,
  ) -> Result<BatchResult, BatchError> {
    let workflow = Workflow::load(&request.workflow_path).await?;
    let stories = load_stories(&request.stories_dir).await?;
    let prompts = stories.prompts();

    info!(
      nodes = workflow.nodes.len(),
      stories = stories.stories.len(),
      skipped_files = stories.skipped.len(),
      prompts = prompts.len(),
      "batch_started"
    );

    if prompts.is_empty() {
      return Err(BatchError::NoPrompts {
        path: request.stories_dir.clone(),
      });
    }

    let mut result = self
      .run_prompts(&workflow, &prompts, &request.target, &request.output_root, cancel)
      .await?;
    result.skipped_files = stories.skipped.into_iter().map(|s| s.path).collect();

    info!(
      succeeded = result.succeeded(),
      failed = result.failed(),
      cancelled = result.cancelled,
      "batch_completed"
    );
    Ok(result)
  }

  /// Run the validation run and then the bulk prompts against an already
  /// loaded workflow.
  pub async fn run_prompts(
    &self,
    workflow: &Workflow,
    prompts: &[String],
    target: &PatchTarget,
    output_root: &Path,
    cancel: &CancellationToken,
  ) -> Result<BatchResult, BatchError> {
    let mut result = BatchResult::default();
    let Some(first) = prompts.first() else {
      return Ok(result);
    };

    let test_dir = output_root.join("test");
    info!(prompt = %first, output_dir = %test_dir.display(), "validation_run_started");
    let output = match self.process_prompt(workflow, target, 0, first, &test_dir).await {
      Ok(output) => output,
      Err(JobError::Patch(e)) => return Err(BatchError::Workflow(e)),
      Err(e) => return Err(validation_failed(first, test_dir, e.into())),
    };
    if output.report.saved.is_empty() && output.report.failures.is_empty() {
      return Err(validation_failed(first, test_dir, ValidationFailure::NoArtifacts));
    }
    if !output.report.failures.is_empty() {
      let failure = ValidationFailure::IncompleteDownload {
        failed: output.report.failures.len(),
        total: output.report.failures.len() + output.report.saved.len(),
      };
      return Err(validation_failed(first, test_dir, failure));
    }
    info!(files = output.report.saved.len(), "validation_run_passed");
    result
      .entries
      .push(PromptOutcome::completed(0, first, test_dir, true, output));

    if self.config.validate_only {
      info!(remaining = prompts.len() - 1, "stopping after validation run");
      return Ok(result);
    }

    for (index, prompt) in prompts.iter().enumerate().skip(1) {
      if index > 1 && !self.config.inter_prompt_delay.is_zero() {
        tokio::select! {
          _ = self.clock.sleep(self.config.inter_prompt_delay) => {}
          _ = cancel.cancelled() => {}
        }
      }
      if cancel.is_cancelled() {
        warn!(remaining = prompts.len() - index, "batch cancelled");
        result.cancelled = true;
        break;
      }

      let output_dir = output_root.join(format!("story_{}", index + 1));
      match self
        .process_prompt(workflow, target, index, prompt, &output_dir)
        .await
      {
        Ok(output) => {
          let outcome = PromptOutcome::completed(index, prompt, output_dir, false, output);
          if outcome.success {
            info!(index, files = outcome.downloaded_files.len(), "prompt_completed");
          } else {
            warn!(
              index,
              files = outcome.downloaded_files.len(),
              failed = outcome.failed_artifacts.len(),
              "prompt_completed_with_missing_artifacts"
            );
          }
          result.entries.push(outcome);
        }
        Err(JobError::Patch(e)) => return Err(BatchError::Workflow(e)),
        Err(e) => {
          error!(index, stage = ?e.stage(), error = %e, "prompt_failed");
          result
            .entries
            .push(PromptOutcome::failed(index, prompt, output_dir, &e));
        }
      }
    }

    Ok(result)
  }

  /// Push one prompt through patch, submit, wait, history and download.
  #[instrument(
    name = "prompt",
    skip(self, workflow, target, prompt, output_dir),
    fields(output_dir = %output_dir.display())
  )]
  pub async fn process_prompt(
    &self,
    workflow: &Workflow,
    target: &PatchTarget,
    index: usize,
    prompt: &str,
    output_dir: &Path,
  ) -> Result<JobOutput, JobError> {
    let patched = workflow.patch(
      &target.node_id,
      &target.input_name,
      serde_json::Value::String(prompt.to_string()),
      target.policy,
    )?;

    let handle = self
      .submitter
      .submit(&self.session, &patched)
      .await
      .map_err(JobError::Submit)?;
    let prompt_id = handle.prompt_id().to_string();

    let status = self
      .poller
      .wait(&self.session, &handle)
      .await
      .map_err(|source| JobError::Wait {
        prompt_id: prompt_id.clone(),
        source,
      })?;
    if let ExecutionStatus::Failed { message } = status {
      return Err(JobError::ExecutionFailed { prompt_id, message });
    }

    let record = self
      .fetcher
      .fetch(&self.session, &handle)
      .await
      .map_err(|source| JobError::History {
        prompt_id: prompt_id.clone(),
        source,
      })?;

    let report = self
      .downloader
      .download(&self.session, &record, output_dir)
      .await
      .map_err(|source| JobError::Download {
        prompt_id: prompt_id.clone(),
        source,
      })?;

    Ok(JobOutput { prompt_id, report })
  }
}

fn validation_failed(prompt: &str, output_dir: PathBuf, reason: ValidationFailure) -> BatchError {
  error!(prompt = %prompt, error = %reason, "validation_run_failed");
  BatchError::ValidationRun {
    prompt: prompt.to_string(),
    output_dir,
    reason,
  }
}
