use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one submitted execution, as issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
  prompt_id: String,
}

impl JobHandle {
  pub fn new(prompt_id: impl Into<String>) -> Self {
    Self {
      prompt_id: prompt_id.into(),
    }
  }

  pub fn prompt_id(&self) -> &str {
    &self.prompt_id
  }
}

impl fmt::Display for JobHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.prompt_id)
  }
}

/// State of a submitted job, derived from the service's queue and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Complete,
  Failed { message: String },
}

impl ExecutionStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Complete | Self::Failed { .. })
  }
}

impl fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Pending => f.write_str("pending"),
      Self::Running => f.write_str("running"),
      Self::Complete => f.write_str("complete"),
      Self::Failed { message } => write!(f, "failed: {}", message),
    }
  }
}
