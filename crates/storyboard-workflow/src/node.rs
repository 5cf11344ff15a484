use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One operator in a workflow graph.
///
/// Fields other than `class_type` and `inputs` (for example the `_meta`
/// title block written by graph editors) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub class_type: String,
  #[serde(default)]
  pub inputs: HashMap<String, serde_json::Value>,
  #[serde(flatten)]
  pub extra: HashMap<String, serde_json::Value>,
}

impl Node {
  pub fn new(class_type: impl Into<String>) -> Self {
    Self {
      class_type: class_type.into(),
      inputs: HashMap::new(),
      extra: HashMap::new(),
    }
  }

  pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
    self.inputs.insert(name.into(), value);
    self
  }

  pub fn input(&self, name: &str) -> Option<&serde_json::Value> {
    self.inputs.get(name)
  }
}
