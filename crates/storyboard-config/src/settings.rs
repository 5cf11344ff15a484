use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Settings for one batch run.
///
/// Every field has a default, so a settings file only needs the keys it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Base URL of the generation service.
  pub server_address: String,

  /// Node whose input receives each prompt.
  pub node_id: String,

  /// Input on `node_id` that receives each prompt.
  pub input_name: String,

  /// Delay between two status queries for the same job.
  pub poll_interval_ms: u64,

  /// Give up on a job that has not finished after this long. `None` waits
  /// as long as the service keeps answering.
  pub poll_timeout_secs: Option<u64>,

  /// Consecutive failed status queries tolerated before polling gives up.
  pub max_poll_errors: u32,

  /// Consecutive status queries in which the service knows nothing about a
  /// job before it is given up as lost.
  pub max_missing_polls: u32,

  /// Per-request timeout for the HTTP client.
  pub request_timeout_secs: u64,

  /// Pause between bulk prompts to spare the service.
  pub inter_prompt_delay_ms: u64,

  /// Abort a job on its first failed artifact instead of recording the
  /// failure and continuing.
  pub abort_on_download_error: bool,

  /// Let the patch add the target input when the node does not declare it.
  pub allow_new_inputs: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      server_address: "http://127.0.0.1:8188".to_string(),
      node_id: "32".to_string(),
      input_name: "text".to_string(),
      poll_interval_ms: 1000,
      poll_timeout_secs: Some(30 * 60),
      max_poll_errors: 5,
      max_missing_polls: 60,
      request_timeout_secs: 60,
      inter_prompt_delay_ms: 2000,
      abort_on_download_error: false,
      allow_new_inputs: false,
    }
  }
}

impl Settings {
  /// Load settings from a JSON file. Missing keys keep their defaults.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        source: e,
      })?;
    serde_json::from_str(&content).map_err(|e| SettingsError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn poll_timeout(&self) -> Option<Duration> {
    self.poll_timeout_secs.map(Duration::from_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn inter_prompt_delay(&self) -> Duration {
    Duration::from_millis(self.inter_prompt_delay_ms)
  }
}
