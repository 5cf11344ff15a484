use storyboard_workflow::Workflow;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::job::JobHandle;
use crate::session::Session;

const ENDPOINT: &str = "/prompt";

/// Queues workflows for execution.
///
/// Submission enqueues real work on the service, so it is never retried
/// here. A caller that wants retries has to submit again explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobSubmitter;

impl JobSubmitter {
  pub fn new() -> Self {
    Self
  }

  /// Submit under the session's client id.
  pub async fn submit(&self, session: &Session, workflow: &Workflow) -> Result<JobHandle, ClientError> {
    self.submit_as(session, workflow, None).await
  }

  /// Submit under `client_id`, falling back to the session's client id.
  pub async fn submit_as(
    &self,
    session: &Session,
    workflow: &Workflow,
    client_id: Option<&str>,
  ) -> Result<JobHandle, ClientError> {
    let client_id = client_id.unwrap_or_else(|| session.client_id());
    let request = serde_json::json!({
      "prompt": workflow,
      "client_id": client_id,
    });

    let response = session
      .transport()
      .post_json(ENDPOINT, &request)
      .await
      .map_err(|e| ClientError::unavailable(ENDPOINT, e.to_string()))?;

    if response.is_server_error() {
      return Err(ClientError::unavailable(
        ENDPOINT,
        format!("HTTP {}: {}", response.status, response.text()),
      ));
    }

    if response.is_client_error() {
      let payload = response.payload();
      warn!(status = response.status, payload = %payload, "workflow_rejected");
      return Err(ClientError::Validation {
        status: response.status,
        payload,
      });
    }

    if !response.is_success() {
      return Err(ClientError::protocol(
        ENDPOINT,
        format!("unexpected HTTP {}", response.status),
      ));
    }

    let body: serde_json::Value = serde_json::from_slice(&response.body)
      .map_err(|e| ClientError::protocol(ENDPOINT, format!("invalid JSON: {}", e)))?;

    if body
      .get("node_errors")
      .and_then(|v| v.as_object())
      .is_some_and(|errors| !errors.is_empty())
    {
      warn!(payload = %body, "workflow_rejected");
      return Err(ClientError::Validation {
        status: response.status,
        payload: body,
      });
    }

    let prompt_id = extract_prompt_id(&body).ok_or_else(|| {
      ClientError::protocol(ENDPOINT, format!("no prompt id in response: {}", body))
    })?;

    info!(prompt_id = %prompt_id, client_id = %client_id, "job_submitted");
    Ok(JobHandle::new(prompt_id))
  }
}

/// Pull the prompt id out of a submission response.
///
/// Current services answer `{"prompt_id": ...}`; older ones used `id` or a
/// bare array whose first element is the id.
fn extract_prompt_id(body: &serde_json::Value) -> Option<String> {
  let candidate = match body {
    serde_json::Value::Object(map) => map.get("prompt_id").or_else(|| map.get("id")),
    serde_json::Value::Array(items) => items.first(),
    _ => None,
  }?;

  match candidate {
    serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
