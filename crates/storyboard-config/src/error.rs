use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
  #[error("stories directory not found: {}", .path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read stories directory {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("failed to read settings file {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid settings file {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
