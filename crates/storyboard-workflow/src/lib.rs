//! Storyboard Workflow
//!
//! This crate provides the in-memory form of a generation workflow graph as
//! the service consumes it: a JSON object keyed by node id, each value a
//! `{class_type, inputs}` record.
//!
//! The only mutation offered is a single-field patch. A patch addresses
//! exactly one `(node_id, input_name)` pair and leaves every other node and
//! every other input untouched. Unknown nodes and unknown inputs are reported
//! as errors instead of silently creating new fields.

mod error;
mod node;
mod workflow;

pub use error::WorkflowError;
pub use node::Node;
pub use workflow::{InputPolicy, Workflow};
