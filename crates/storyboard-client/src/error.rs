use std::time::Duration;

use thiserror::Error;

use crate::job::ExecutionStatus;

/// Errors raised while talking to the generation service.
#[derive(Debug, Error)]
pub enum ClientError {
  /// The server address could not be turned into a base URL.
  #[error("invalid server address '{address}': {message}")]
  InvalidAddress { address: String, message: String },

  /// The service could not be reached or answered with a server error.
  #[error("service unavailable at {endpoint}: {message}")]
  ServiceUnavailable { endpoint: String, message: String },

  /// The service rejected the submitted workflow. `payload` is the
  /// service's own diagnostic body.
  #[error("service rejected workflow (HTTP {status}): {payload}")]
  Validation {
    status: u16,
    payload: serde_json::Value,
  },

  /// The response did not have the expected shape.
  #[error("unexpected response from {endpoint}: {message}")]
  Protocol { endpoint: String, message: String },

  /// The service does not know this job.
  #[error("no history for prompt '{prompt_id}'")]
  NotFound { prompt_id: String },

  /// The job did not reach a terminal state in time.
  #[error("prompt '{prompt_id}' did not finish within {elapsed:?} (last seen: {})", describe(.last_status))]
  Timeout {
    prompt_id: String,
    elapsed: Duration,
    last_status: Option<ExecutionStatus>,
  },

  /// Status queries kept failing.
  #[error("polling prompt '{prompt_id}' failed {attempts} times in a row: {message}")]
  Polling {
    prompt_id: String,
    attempts: u32,
    message: String,
  },
}

impl ClientError {
  pub(crate) fn unavailable(endpoint: &str, message: impl Into<String>) -> Self {
    Self::ServiceUnavailable {
      endpoint: endpoint.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn protocol(endpoint: &str, message: impl Into<String>) -> Self {
    Self::Protocol {
      endpoint: endpoint.to_string(),
      message: message.into(),
    }
  }
}

fn describe(status: &Option<ExecutionStatus>) -> String {
  match status {
    Some(status) => status.to_string(),
    None => "missing".to_string(),
  }
}
