//! Completion polling.
//!
//! A job moves `pending -> running -> complete | failed`. The service never
//! pushes these transitions; the poller derives them on every round:
//!
//! 1. `GET /history/{id}`: an entry means the job ended (complete, or failed
//!    when the entry carries an execution error).
//! 2. `GET /queue`: the id in `queue_running` or `queue_pending`.
//! 3. Neither: the job is missing. Polling continues until the timeout or
//!    until `max_missing_polls` rounds in a row found nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::{Clock, TokioClock};
use crate::error::ClientError;
use crate::history::{history_endpoint, parse_history};
use crate::job::{ExecutionStatus, JobHandle};
use crate::session::Session;

const QUEUE_ENDPOINT: &str = "/queue";

/// Polling cadence and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
  /// Sleep between two status rounds.
  pub interval: Duration,
  /// Maximum time to wait for a terminal state. `None` waits indefinitely
  /// while the service keeps answering.
  pub timeout: Option<Duration>,
  /// Consecutive failed rounds tolerated before giving up.
  pub max_errors: u32,
  /// Consecutive rounds in which the service knows nothing about the job
  /// before it is reported as timed out. Applies with or without `timeout`.
  pub max_missing_polls: u32,
}

impl Default for PollConfig {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(1),
      timeout: Some(Duration::from_secs(30 * 60)),
      max_errors: 5,
      max_missing_polls: 60,
    }
  }
}

/// Outcome of one failed status round.
enum RoundError {
  /// Worth another try: connection trouble or a 5xx.
  Transient(String),
  /// Retrying will not help.
  Fatal(ClientError),
}

/// Blocks until a submitted job reaches a terminal state.
pub struct CompletionPoller {
  config: PollConfig,
  clock: Arc<dyn Clock>,
}

impl CompletionPoller {
  pub fn new(config: PollConfig) -> Self {
    Self::with_clock(config, Arc::new(TokioClock))
  }

  pub fn with_clock(config: PollConfig, clock: Arc<dyn Clock>) -> Self {
    Self { config, clock }
  }

  /// Query the current status once. `Ok(None)` means the service knows
  /// nothing about the job.
  pub async fn status(
    &self,
    session: &Session,
    handle: &JobHandle,
  ) -> Result<Option<ExecutionStatus>, ClientError> {
    self.round(session, handle).await.map_err(|e| match e {
      RoundError::Transient(message) => ClientError::unavailable(&history_endpoint(handle), message),
      RoundError::Fatal(e) => e,
    })
  }

  /// Poll until the job completes or fails.
  ///
  /// Returns the terminal status. Errors with [`ClientError::Polling`] once
  /// more than `max_errors` rounds in a row failed, and with
  /// [`ClientError::Timeout`] when the timeout passes first or the job stays
  /// missing for more than `max_missing_polls` rounds.
  pub async fn wait(&self, session: &Session, handle: &JobHandle) -> Result<ExecutionStatus, ClientError> {
    let started = self.clock.now();
    let mut consecutive_errors: u32 = 0;
    let mut consecutive_missing: u32 = 0;
    let mut last_status: Option<ExecutionStatus> = None;
    let mut polls: u32 = 0;

    loop {
      polls += 1;
      match self.round(session, handle).await {
        Ok(Some(status)) if status.is_terminal() => {
          info!(prompt_id = %handle, polls, status = %status, "job_finished");
          return Ok(status);
        }
        Ok(observed) => {
          consecutive_errors = 0;
          consecutive_missing = if observed.is_none() {
            consecutive_missing + 1
          } else {
            0
          };
          if observed != last_status {
            debug!(
              prompt_id = %handle,
              status = %observed.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "missing".to_string()),
              "job_status_changed"
            );
          }
          last_status = observed;
        }
        Err(RoundError::Transient(message)) => {
          consecutive_errors += 1;
          warn!(
            prompt_id = %handle,
            attempt = consecutive_errors,
            max_errors = self.config.max_errors,
            error = %message,
            "status query failed"
          );
          if consecutive_errors > self.config.max_errors {
            return Err(ClientError::Polling {
              prompt_id: handle.prompt_id().to_string(),
              attempts: consecutive_errors,
              message,
            });
          }
        }
        Err(RoundError::Fatal(e)) => return Err(e),
      }

      let elapsed = self.clock.now().saturating_duration_since(started);
      if consecutive_missing > self.config.max_missing_polls {
        warn!(prompt_id = %handle, polls, "job missing from queue and history");
        return Err(ClientError::Timeout {
          prompt_id: handle.prompt_id().to_string(),
          elapsed,
          last_status: None,
        });
      }
      if let Some(timeout) = self.config.timeout
        && elapsed >= timeout
      {
        return Err(ClientError::Timeout {
          prompt_id: handle.prompt_id().to_string(),
          elapsed,
          last_status,
        });
      }

      self.clock.sleep(self.config.interval).await;
    }
  }

  async fn round(
    &self,
    session: &Session,
    handle: &JobHandle,
  ) -> Result<Option<ExecutionStatus>, RoundError> {
    let endpoint = history_endpoint(handle);
    let history = fetch_json(session, &endpoint, true).await?;
    if let Some(history) = history {
      let record = parse_history(handle.prompt_id(), &history)
        .map_err(|message| RoundError::Fatal(ClientError::protocol(&endpoint, message)))?;
      if let Some(record) = record {
        return Ok(Some(record.status));
      }
    }

    let queue = fetch_json(session, QUEUE_ENDPOINT, false)
      .await?
      .unwrap_or(serde_json::Value::Null);
    let id = handle.prompt_id();
    if queue_contains(&queue, "queue_running", id) {
      Ok(Some(ExecutionStatus::Running))
    } else if queue_contains(&queue, "queue_pending", id) {
      Ok(Some(ExecutionStatus::Pending))
    } else {
      Ok(None)
    }
  }
}

/// GET a JSON body. With `missing_ok`, a 404 yields `Ok(None)`.
async fn fetch_json(
  session: &Session,
  endpoint: &str,
  missing_ok: bool,
) -> Result<Option<serde_json::Value>, RoundError> {
  let response = session
    .transport()
    .get(endpoint, &[])
    .await
    .map_err(|e| RoundError::Transient(e.to_string()))?;

  if missing_ok && response.status == 404 {
    return Ok(None);
  }
  if response.is_server_error() {
    return Err(RoundError::Transient(format!(
      "{} answered HTTP {}",
      endpoint, response.status
    )));
  }
  if !response.is_success() {
    return Err(RoundError::Fatal(ClientError::protocol(
      endpoint,
      format!("unexpected HTTP {}", response.status),
    )));
  }

  serde_json::from_slice(&response.body)
    .map(Some)
    .map_err(|e| RoundError::Fatal(ClientError::protocol(endpoint, format!("invalid JSON: {}", e))))
}

/// Whether a queue list holds the job. Items are either arrays of the form
/// `[number, prompt_id, prompt, ...]` or objects with a `prompt_id` field.
fn queue_contains(queue: &serde_json::Value, list: &str, prompt_id: &str) -> bool {
  let Some(items) = queue.get(list).and_then(|v| v.as_array()) else {
    return false;
  };

  items.iter().any(|item| match item {
    serde_json::Value::Array(fields) => fields
      .iter()
      .take(2)
      .any(|f| f.as_str() == Some(prompt_id)),
    serde_json::Value::Object(map) => {
      map.get("prompt_id").and_then(|v| v.as_str()) == Some(prompt_id)
    }
    _ => false,
  })
}
