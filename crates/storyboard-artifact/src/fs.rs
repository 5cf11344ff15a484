use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{Store, StoreError};

/// Filesystem store writing every artifact directly under one directory.
///
/// The directory and its parents are created on the first `put`.
#[derive(Debug, Clone)]
pub struct FsStore {
  root: PathBuf,
}

impl FsStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Create the root directory and its parents if they do not exist yet.
  pub async fn create_root(&self) -> Result<(), StoreError> {
    fs::create_dir_all(&self.root)
      .await
      .map_err(|e| StoreError::Io {
        path: self.root.clone(),
        source: e,
      })
  }
}

#[async_trait]
impl Store for FsStore {
  async fn put(&self, key: &str, data: Bytes) -> Result<PathBuf, StoreError> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
      return Err(StoreError::InvalidKey(key.to_string()));
    }

    self.create_root().await?;

    let path = self.root.join(key);
    let io_err = |e| StoreError::Io {
      path: path.clone(),
      source: e,
    };
    let mut file = fs::File::create(&path).await.map_err(io_err)?;
    file.write_all(&data).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;

    Ok(path)
  }
}
