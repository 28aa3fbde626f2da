//! Shared model types for Manifold.
//!
//! The declarative process model produced by document loaders lives in
//! [`process`]; [`problem`] carries the non-fatal diagnostics reported while a
//! model is turned into an executable definition.

pub mod problem;
pub mod process;

pub use problem::Problem;
pub use process::{FlowNode, FlowNodeKind, LoopCharacteristics, MultiInstanceMode, ProcessModel, UserTaskAssignment};
