//! Storyboard Artifact
//!
//! Fetches the files a finished job produced and persists them.
//!
//! The [`Store`] trait is the persistence seam; [`FsStore`] writes into a
//! directory, creating it on first use. [`ArtifactDownloader`] walks a
//! [`HistoryRecord`](storyboard_client::HistoryRecord), retrieves each
//! artifact through `GET /view` and hands the bytes to a store under a
//! deterministic, collision-free name.

mod download;
mod fs;

pub use download::{ArtifactDownloader, ArtifactFailure, DownloadError, DownloadPolicy, DownloadReport, artifact_file_name};
pub use fs::FsStore;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

/// Error type for artifact storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The key is not a plain file name.
  #[error("invalid artifact key: {0}")]
  InvalidKey(String),

  /// An I/O error occurred.
  #[error("io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Artifact storage trait.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist `data` under `key` and return where it ended up.
  async fn put(&self, key: &str, data: Bytes) -> Result<PathBuf, StoreError>;
}
