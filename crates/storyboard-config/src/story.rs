use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoryError;

/// One page of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDef {
  #[serde(default)]
  pub text: String,
  /// Image description for this page; this is the prompt that gets injected.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
}

/// A story file: a title and its pages in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDef {
  #[serde(default)]
  pub title: String,
  pub pages: Vec<PageDef>,
}

impl StoryDef {
  /// Image prompts of this story in page order. Pages without an image are
  /// left out.
  pub fn prompts(&self) -> impl Iterator<Item = &str> {
    self.pages.iter().filter_map(|p| p.image.as_deref())
  }
}

/// A story together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedStory {
  pub path: PathBuf,
  pub story: StoryDef,
}

/// A JSON file in the stories directory that was not usable.
#[derive(Debug, Clone)]
pub struct SkippedFile {
  pub path: PathBuf,
  pub reason: String,
}

/// Every story found in a directory, in file-name order.
#[derive(Debug, Clone, Default)]
pub struct StoryBatch {
  pub stories: Vec<LoadedStory>,
  pub skipped: Vec<SkippedFile>,
}

impl StoryBatch {
  /// All image prompts, story by story and page by page.
  pub fn prompts(&self) -> Vec<String> {
    self
      .stories
      .iter()
      .flat_map(|s| s.story.prompts())
      .map(str::to_string)
      .collect()
  }
}

/// Read every `*.json` story in `dir`.
///
/// Files that cannot be read or do not have the story shape are logged and
/// recorded in [`StoryBatch::skipped`]; they never fail the whole load.
pub async fn load_stories(dir: impl AsRef<Path>) -> Result<StoryBatch, StoryError> {
  let dir = dir.as_ref();
  if !dir.is_dir() {
    return Err(StoryError::NotFound {
      path: dir.to_path_buf(),
    });
  }

  let io_err = |e| StoryError::Io {
    path: dir.to_path_buf(),
    source: e,
  };

  let mut entries = fs::read_dir(dir).await.map_err(io_err)?;
  let mut paths = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
    let path = entry.path();
    if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
      paths.push(path);
    }
  }
  paths.sort();

  let mut batch = StoryBatch::default();
  for path in paths {
    match read_story(&path).await {
      Ok(story) => {
        debug!(path = %path.display(), title = %story.title, pages = story.pages.len(), "story_loaded");
        batch.stories.push(LoadedStory { path, story });
      }
      Err(reason) => {
        warn!(path = %path.display(), reason = %reason, "skipping story file");
        batch.skipped.push(SkippedFile { path, reason });
      }
    }
  }

  Ok(batch)
}

async fn read_story(path: &Path) -> Result<StoryDef, String> {
  let bytes = fs::read(path).await.map_err(|e| e.to_string())?;
  serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
