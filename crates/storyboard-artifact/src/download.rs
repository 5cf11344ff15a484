use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use storyboard_client::{ArtifactRef, HistoryRecord, Session};
use tracing::{info, warn};

use crate::fs::FsStore;
use crate::{Store, StoreError};

const VIEW_ENDPOINT: &str = "/view";

/// What to do when one artifact of a job cannot be saved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPolicy {
  /// Record the failure and keep going with the remaining artifacts.
  #[default]
  SkipAndContinue,
  /// Stop at the first failure and fail the whole download.
  AbortJob,
}

/// Failure to save one artifact.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
  #[error("failed to retrieve '{filename}': {message}")]
  Retrieve { filename: String, message: String },

  #[error("failed to retrieve '{filename}': HTTP {status}")]
  Status { filename: String, status: u16 },

  #[error("failed to prepare output directory {}: {source}", .path.display())]
  OutputDir {
    path: PathBuf,
    #[source]
    source: StoreError,
  },

  #[error("failed to store '{filename}': {source}")]
  Store {
    filename: String,
    #[source]
    source: StoreError,
  },
}

/// An artifact that could not be saved, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFailure {
  pub node_id: String,
  pub artifact: ArtifactRef,
  pub error: String,
}

/// Saved files in record order, plus every artifact that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadReport {
  pub saved: Vec<PathBuf>,
  pub failures: Vec<ArtifactFailure>,
}

impl DownloadReport {
  pub fn is_complete(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Local file name for the `ordinal`-th artifact (1-based) of a job.
///
/// Directory components of the service's file name are dropped, so a
/// reported name can never escape the output directory.
pub fn artifact_file_name(ordinal: usize, filename: &str) -> String {
  let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
  let base = match base {
    "" | "." | ".." => "artifact",
    other => other,
  };
  format!("{:02}_{}", ordinal, base)
}

/// Retrieves the artifacts of a history record and stores them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactDownloader {
  policy: DownloadPolicy,
}

impl ArtifactDownloader {
  pub fn new(policy: DownloadPolicy) -> Self {
    Self { policy }
  }

  /// Save every artifact of `record` into `output_dir`.
  ///
  /// `output_dir` exists afterwards even when the record has no artifacts.
  pub async fn download(
    &self,
    session: &Session,
    record: &HistoryRecord,
    output_dir: &Path,
  ) -> Result<DownloadReport, DownloadError> {
    let store = FsStore::new(output_dir);
    store
      .create_root()
      .await
      .map_err(|source| DownloadError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
      })?;
    self.download_to(session, record, &store).await
  }

  /// Save every artifact of `record` into `store`.
  pub async fn download_to(
    &self,
    session: &Session,
    record: &HistoryRecord,
    store: &dyn Store,
  ) -> Result<DownloadReport, DownloadError> {
    let mut report = DownloadReport::default();

    for (index, (node_id, artifact)) in record.artifacts().enumerate() {
      let key = artifact_file_name(index + 1, &artifact.filename);
      match save_one(session, artifact, store, &key).await {
        Ok(path) => {
          info!(
            prompt_id = %record.prompt_id,
            node_id = %node_id,
            path = %path.display(),
            "artifact_saved"
          );
          report.saved.push(path);
        }
        Err(e) => {
          warn!(
            prompt_id = %record.prompt_id,
            node_id = %node_id,
            filename = %artifact.filename,
            error = %e,
            "artifact_failed"
          );
          if self.policy == DownloadPolicy::AbortJob {
            return Err(e);
          }
          report.failures.push(ArtifactFailure {
            node_id: node_id.to_string(),
            artifact: artifact.clone(),
            error: e.to_string(),
          });
        }
      }
    }

    Ok(report)
  }
}

async fn save_one(
  session: &Session,
  artifact: &ArtifactRef,
  store: &dyn Store,
  key: &str,
) -> Result<PathBuf, DownloadError> {
  let bytes = retrieve(session, artifact).await?;
  store
    .put(key, bytes)
    .await
    .map_err(|e| DownloadError::Store {
      filename: artifact.filename.clone(),
      source: e,
    })
}

async fn retrieve(session: &Session, artifact: &ArtifactRef) -> Result<Bytes, DownloadError> {
  let query = [
    ("filename", artifact.filename.as_str()),
    ("subfolder", artifact.subfolder.as_str()),
    ("type", artifact.kind.as_str()),
  ];
  let response = session
    .transport()
    .get(VIEW_ENDPOINT, &query)
    .await
    .map_err(|e| DownloadError::Retrieve {
      filename: artifact.filename.clone(),
      message: e.to_string(),
    })?;

  if !response.is_success() {
    return Err(DownloadError::Status {
      filename: artifact.filename.clone(),
      status: response.status,
    });
  }
  Ok(response.body)
}
