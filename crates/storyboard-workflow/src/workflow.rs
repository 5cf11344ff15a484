use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::WorkflowError;
use crate::node::Node;

/// How a patch treats an input name the target node does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPolicy {
  /// Reject the patch with [`WorkflowError::UnknownInput`].
  #[default]
  Strict,
  /// Add the input to the target node. Only that node's input map grows.
  Permissive,
}

/// A workflow graph keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow {
  pub nodes: HashMap<String, Node>,
}

impl Workflow {
  pub fn new(nodes: HashMap<String, Node>) -> Self {
    Self { nodes }
  }

  /// Read and parse a workflow file.
  pub async fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        WorkflowError::NotFound {
          path: path.to_path_buf(),
        }
      } else {
        WorkflowError::Io {
          path: path.to_path_buf(),
          source: e,
        }
      }
    })?;

    let workflow: Workflow =
      serde_json::from_slice(&bytes).map_err(|e| WorkflowError::Malformed {
        path: path.to_path_buf(),
        source: e,
      })?;

    debug!(path = %path.display(), nodes = workflow.nodes.len(), "workflow_loaded");
    Ok(workflow)
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// Look up the current value of one input.
  pub fn input(&self, node_id: &str, input_name: &str) -> Option<&serde_json::Value> {
    self.nodes.get(node_id).and_then(|n| n.input(input_name))
  }

  /// Return a copy of this workflow with exactly one input replaced.
  ///
  /// The receiver is left as it was, so a base workflow can be patched once
  /// per prompt without accumulating edits.
  pub fn patch(
    &self,
    node_id: &str,
    input_name: &str,
    value: serde_json::Value,
    policy: InputPolicy,
  ) -> Result<Self, WorkflowError> {
    let mut patched = self.clone();
    patched.set_input(node_id, input_name, value, policy)?;
    Ok(patched)
  }

  /// Replace exactly one input in place.
  ///
  /// On error the workflow is unchanged.
  pub fn set_input(
    &mut self,
    node_id: &str,
    input_name: &str,
    value: serde_json::Value,
    policy: InputPolicy,
  ) -> Result<(), WorkflowError> {
    let node = self
      .nodes
      .get_mut(node_id)
      .ok_or_else(|| WorkflowError::UnknownNode(node_id.to_string()))?;

    match node.inputs.get_mut(input_name) {
      Some(slot) => {
        *slot = value;
      }
      None => match policy {
        InputPolicy::Strict => {
          return Err(WorkflowError::UnknownInput {
            node_id: node_id.to_string(),
            class_type: node.class_type.clone(),
            input_name: input_name.to_string(),
          });
        }
        InputPolicy::Permissive => {
          warn!(
            node_id = %node_id,
            class_type = %node.class_type,
            input_name = %input_name,
            "adding undeclared input to node"
          );
          node.inputs.insert(input_name.to_string(), value);
        }
      },
    }

    debug!(node_id = %node_id, input_name = %input_name, "workflow_patched");
    Ok(())
  }

  pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}
