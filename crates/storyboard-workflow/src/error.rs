use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow file not found: {}", .path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read workflow file {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed workflow {}: {source}", .path.display())]
  Malformed {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("node not found: {0}")]
  UnknownNode(String),

  #[error("node '{node_id}' ({class_type}) has no input named '{input_name}'")]
  UnknownInput {
    node_id: String,
    class_type: String,
    input_name: String,
  },
}
