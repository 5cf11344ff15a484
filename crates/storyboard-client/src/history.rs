use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClientError;
use crate::job::{ExecutionStatus, JobHandle};
use crate::session::Session;

/// Reference to one generated file held by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub filename: String,
  #[serde(default)]
  pub subfolder: String,
  #[serde(rename = "type", default = "default_kind")]
  pub kind: String,
}

fn default_kind() -> String {
  "output".to_string()
}

/// Outputs of a finished job, keyed by output node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
  pub prompt_id: String,
  pub outputs: BTreeMap<String, Vec<ArtifactRef>>,
  pub status: ExecutionStatus,
}

impl HistoryRecord {
  /// Every artifact with the node that produced it, ordered by node id and
  /// then by the service's listing order.
  pub fn artifacts(&self) -> impl Iterator<Item = (&str, &ArtifactRef)> {
    self
      .outputs
      .iter()
      .flat_map(|(node_id, refs)| refs.iter().map(move |r| (node_id.as_str(), r)))
  }

  pub fn artifact_count(&self) -> usize {
    self.outputs.values().map(Vec::len).sum()
  }
}

/// Reads finished jobs from the service's history store.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryFetcher;

impl HistoryFetcher {
  pub fn new() -> Self {
    Self
  }

  /// Fetch the history record of a job.
  ///
  /// Only call this after the job reached a terminal state; before that the
  /// service has no entry and this returns [`ClientError::NotFound`].
  pub async fn fetch(&self, session: &Session, handle: &JobHandle) -> Result<HistoryRecord, ClientError> {
    let endpoint = history_endpoint(handle);
    let response = session
      .transport()
      .get(&endpoint, &[])
      .await
      .map_err(|e| ClientError::unavailable(&endpoint, e.to_string()))?;

    if response.status == 404 {
      return Err(ClientError::NotFound {
        prompt_id: handle.prompt_id().to_string(),
      });
    }
    if response.is_server_error() {
      return Err(ClientError::unavailable(
        &endpoint,
        format!("HTTP {}: {}", response.status, response.text()),
      ));
    }
    if !response.is_success() {
      return Err(ClientError::protocol(
        &endpoint,
        format!("unexpected HTTP {}", response.status),
      ));
    }

    let body: serde_json::Value = serde_json::from_slice(&response.body)
      .map_err(|e| ClientError::protocol(&endpoint, format!("invalid JSON: {}", e)))?;

    let record = parse_history(handle.prompt_id(), &body)
      .map_err(|message| ClientError::protocol(&endpoint, message))?
      .ok_or_else(|| ClientError::NotFound {
        prompt_id: handle.prompt_id().to_string(),
      })?;

    debug!(
      prompt_id = %handle,
      artifacts = record.artifact_count(),
      "history_fetched"
    );
    Ok(record)
  }
}

pub(crate) fn history_endpoint(handle: &JobHandle) -> String {
  format!("/history/{}", handle.prompt_id())
}

/// Project a `/history/{id}` body into a record.
///
/// Accepts both the keyed form `{"<id>": {outputs, status}}` and a bare
/// `{outputs, status}` entry. Returns `Ok(None)` when the body has no entry
/// for the job.
pub(crate) fn parse_history(
  prompt_id: &str,
  body: &serde_json::Value,
) -> Result<Option<HistoryRecord>, String> {
  let map = body
    .as_object()
    .ok_or_else(|| format!("expected a JSON object, got {}", body))?;

  let entry = match map.get(prompt_id) {
    Some(entry) => entry,
    None if map.contains_key("outputs") => body,
    None => return Ok(None),
  };

  let entry = entry
    .as_object()
    .ok_or_else(|| format!("history entry for '{}' is not an object", prompt_id))?;

  let mut outputs = BTreeMap::new();
  if let Some(raw_outputs) = entry.get("outputs") {
    let raw_outputs = raw_outputs
      .as_object()
      .ok_or_else(|| "'outputs' is not an object".to_string())?;

    for (node_id, node_output) in raw_outputs {
      let node_output = node_output
        .as_object()
        .ok_or_else(|| format!("output of node '{}' is not an object", node_id))?;

      let Some(images) = node_output.get("images") else {
        continue;
      };
      let refs: Vec<ArtifactRef> = serde_json::from_value(images.clone())
        .map_err(|e| format!("images of node '{}': {}", node_id, e))?;
      let refs: Vec<ArtifactRef> = refs.into_iter().filter(|r| !r.filename.is_empty()).collect();

      if !refs.is_empty() {
        outputs.insert(node_id.clone(), refs);
      }
    }
  }

  Ok(Some(HistoryRecord {
    prompt_id: prompt_id.to_string(),
    outputs,
    status: parse_status(entry.get("status")),
  }))
}

/// Terminal status of a history entry. Entries only appear once execution
/// ended, so anything other than an explicit error counts as complete.
fn parse_status(status: Option<&serde_json::Value>) -> ExecutionStatus {
  let Some(status) = status else {
    return ExecutionStatus::Complete;
  };
  if status.get("status_str").and_then(|s| s.as_str()) != Some("error") {
    return ExecutionStatus::Complete;
  }

  let message = status
    .get("messages")
    .and_then(|m| m.as_array())
    .into_iter()
    .flatten()
    .filter_map(|m| m.as_array())
    .find(|m| m.first().and_then(|e| e.as_str()) == Some("execution_error"))
    .and_then(|m| m.get(1))
    .map(|data| {
      let field = |name: &str| {
        data
          .get(name)
          .and_then(|v| v.as_str())
          .unwrap_or("?")
          .to_string()
      };
      format!(
        "node {} ({}): {}",
        field("node_id"),
        field("node_type"),
        field("exception_message").trim()
      )
    })
    .unwrap_or_else(|| "execution reported status 'error'".to_string());

  ExecutionStatus::Failed { message }
}
