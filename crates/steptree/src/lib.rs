//! Step-driven behavior tree engine.
//!
//! Trees are advanced one step at a time by the host. Each step walks the
//! active part of the tree, re-checks every guard between the root and each
//! active node, and lets leaves report progress without blocking.
//!
//! - **Four states**: nodes are READY, RUNNING, SUCCEEDED or FAILED
//! - **Guard paths**: `while`/`until` guards on any ancestor can abort a
//!   running subtree mid-flight
//! - **Non-blocking leaves**: actions may return a pending future that is
//!   polled once per step
//! - **Injectable sources**: randomness and elapsed time come from
//!   [`TreeOptions`], so runs can be made deterministic
//!
//! # Architecture
//!
//! - [`Tree`]: builds an arena of nodes from a [`TreeDefinition`] and drives it
//! - [`Agent`]: the host-side table of named functions
//! - [`registry`]: process-wide fallback for functions and subtrees
//! - [`builder`]: helpers for writing definitions in Rust
//! - Composite nodes: sequence, selector, parallel, race, all, lotto
//! - Decorator nodes: root, branch, repeat, retry, flip, succeed, fail
//! - Leaf nodes: action, condition, wait

pub mod agent;
mod assemble;
pub mod attribute;
pub mod builder;
mod composite;
mod decorator;
pub mod definition;
pub mod error;
mod leaf;
pub mod node;
pub mod options;
pub mod registry;
pub mod state;
pub mod tree;

// Re-export core types for ergonomic API
pub use agent::{Agent, CallValue, FnAgent, PendingAction};
pub use attribute::{Attributes, CallbackKind, ExitDetails, GuardKind};
pub use definition::{NodeDefinition, TreeDefinition};
pub use error::{ContractViolation, DefinitionError, RegistryError, Result, TreeError};
pub use node::{NodeId, NodeType};
pub use options::TreeOptions;
pub use state::State;
pub use tree::{NodeDetails, Tree};
