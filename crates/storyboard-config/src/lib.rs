//! Storyboard Config
//!
//! This crate contains the serializable inputs of a batch run:
//!
//! - Story files: `{title, pages: [{text, image}]}` JSON documents whose
//!   `image` fields are the prompts injected into the workflow.
//! - [`Settings`]: service address, patch target, polling cadence and the
//!   other knobs a run is configured with. Settings can be loaded from a JSON
//!   file and are then overridden field by field from the command line.

mod error;
mod settings;
mod story;

pub use error::{SettingsError, StoryError};
pub use settings::Settings;
pub use story::{LoadedStory, PageDef, SkippedFile, StoryBatch, StoryDef, load_stories};
