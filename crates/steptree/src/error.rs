//! Error types raised while building and stepping trees.
//!
//! Errors fall into three tiers:
//! - [`DefinitionError`]: malformed definitions, fatal to tree construction
//! - [`TreeError::Lookup`] / [`TreeError::SubtreeLookup`]: unresolved names,
//!   fatal to the current step only
//! - [`ContractViolation`]: a function returned something outside its allowed
//!   set, surfaced to the caller of the step with tree state left as-is
//!
//! Guard-triggered aborts are ordinary control flow and never appear here.

use thiserror::Error;

use crate::node::NodeType;

pub type Result<T> = std::result::Result<T, TreeError>;

/// Malformed tree shape or out-of-range node arguments.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("malformed definition: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{node_type} node must have at least one child")]
    NoChildren { node_type: NodeType },

    #[error("lotto node has {children} children but {weights} weights")]
    WeightCount { children: usize, weights: usize },

    #[error("lotto weight {weight} at index {index} is not a positive integer")]
    NonPositiveWeight { index: usize, weight: i64 },

    #[error("{node_type} {field} must not be negative, found {value}")]
    NegativeValue {
        node_type: NodeType,
        field: &'static str,
        value: i64,
    },

    #[error("{node_type} {field} range minimum {min} exceeds maximum {max}")]
    InvertedRange {
        node_type: NodeType,
        field: &'static str,
        min: i64,
        max: i64,
    },

    #[error("{node_type} node has an empty function or subtree name")]
    EmptyName { node_type: NodeType },

    #[error("top-level definitions must be root nodes, found {node_type}")]
    RootExpected { node_type: NodeType },

    #[error("definition has no unnamed main root")]
    MissingMainRoot,

    #[error("definition has more than one unnamed main root")]
    MultipleMainRoots,

    #[error("subtree '{0}' is defined more than once")]
    DuplicateSubtree(String),

    #[error("node id '{0}' is used by more than one node")]
    DuplicateNodeId(String),

    #[error("subtree '{0}' references itself")]
    SubtreeCycle(String),
}

/// A function, guard or async handle broke its return-value contract.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("condition '{call}' must return a boolean, returned {found}")]
    ConditionReturn { call: String, found: String },

    #[error("guard '{call}' must return a boolean, returned {found}")]
    GuardReturn { call: String, found: String },

    #[error(
        "action '{call}' must return nothing, SUCCEEDED, FAILED or a pending handle, returned {found}"
    )]
    ActionReturn { call: String, found: String },

    #[error("pending action '{call}' settled with {state}, expected SUCCEEDED or FAILED")]
    PendingState {
        call: String,
        state: crate::State,
    },

    #[error("random source returned {0}, expected a value in [0, 1)")]
    RandomOutOfRange(f64),

    #[error("delta time source returned {0}, expected a finite non-negative number of seconds")]
    InvalidDeltaTime(f64),
}

/// Errors raised from the process-wide registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("function registry lock was poisoned")]
    LockPoisoned,

    #[error("registry name must not be empty")]
    EmptyName,

    #[error("invalid subtree definition: {0}")]
    Definition(#[from] DefinitionError),
}

/// Errors surfaced to the caller of [`Tree::step`](crate::Tree::step).
#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("function '{name}' is not defined on the agent or in the registry")]
    Lookup { name: String },

    #[error("subtree '{name}' is not defined in the tree or in the registry")]
    SubtreeLookup { name: String },

    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error("pending action '{call}' settled with an error")]
    Action {
        call: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
