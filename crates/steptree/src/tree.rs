//! The tree driver: owns the arena and runs one step at a time.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::Agent;
use crate::assemble;
use crate::attribute::Attributes;
use crate::definition::{NodeDefinition, TreeDefinition};
use crate::error::{ContractViolation, DefinitionError, Result};
use crate::node::{self, Arena, NodeId, NodeKind, NodeType, TickContext, UpdateOutcome};
use crate::options::TreeOptions;
use crate::State;

/// A built behavior tree.
///
/// A tree is driven externally: each call to [`Tree::step`] updates the
/// root once and returns its state. Trees are independent of each other
/// and may be stepped from different threads; the only shared state is the
/// [registry](crate::registry).
///
/// # Example
///
/// ```rust
/// use steptree::builder::{action, condition, root, sequence};
/// use steptree::{CallValue, FnAgent, State, Tree, TreeOptions};
///
/// let definition = root(sequence(vec![condition("IsHungry"), action("Eat")]));
/// let mut tree = Tree::new(definition, TreeOptions::default())?;
///
/// let mut agent = FnAgent::new()
///     .with("IsHungry", |_| CallValue::Bool(true))
///     .with("Eat", |_| CallValue::State(State::Succeeded));
///
/// assert_eq!(tree.step(&mut agent)?, State::Succeeded);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Tree {
    arena: Arena,
    root: NodeId,
    /// Named roots declared alongside the main root.
    subtrees: HashMap<String, NodeDefinition>,
    options: TreeOptions,
}

impl Tree {
    /// Builds a tree, validating the main root and every named root.
    pub fn new(
        definition: impl Into<TreeDefinition>,
        options: TreeOptions,
    ) -> std::result::Result<Self, DefinitionError> {
        let definition = definition.into();
        let (main, subtrees) = split_roots(&definition)?;

        for subtree in subtrees.values() {
            assemble::validate(subtree)?;
        }

        let mut arena = Arena::default();
        let root = assemble::instantiate(&mut arena, main, &[])?;
        arena.adopt(None, root);

        debug!(
            nodes = arena.len(),
            subtrees = subtrees.len(),
            "built tree"
        );

        Ok(Self {
            arena,
            root,
            subtrees,
            options,
        })
    }

    /// Parses a JSON definition and builds it.
    pub fn from_json(text: &str, options: TreeOptions) -> std::result::Result<Self, DefinitionError> {
        Self::new(TreeDefinition::from_json(text)?, options)
    }

    /// Advances the tree by one step and returns the root state.
    ///
    /// A tree that resolved on the previous step is reset first, so stepping
    /// a finished tree starts it over. Errors abandon the step part-way and
    /// leave node states as they were when the error surfaced.
    pub fn step(&mut self, agent: &mut dyn Agent) -> Result<State> {
        if self.state().is_resolved() {
            self.reset();
        }

        let seconds = (self.options.delta_time)();
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ContractViolation::InvalidDeltaTime(seconds).into());
        }

        let delta = Duration::try_from_secs_f64(seconds)
            .map_err(|_| ContractViolation::InvalidDeltaTime(seconds))?;

        let mut ctx = TickContext {
            agent,
            random: &mut self.options.random,
            delta,
            subtrees: &self.subtrees,
        };

        let state = match node::update(&mut self.arena, self.root, &mut ctx)? {
            UpdateOutcome::Settled(state) => state,
            // Guard paths never reach above the root, so this lands on the root itself.
            UpdateOutcome::Aborted(abort) => abort.state,
        };

        debug!(%state, delta = seconds, "stepped tree");
        Ok(state)
    }

    /// Returns every node to READY without firing callbacks.
    pub fn reset(&mut self) {
        node::reset(&mut self.arena, self.root);
        debug!("reset tree");
    }

    /// State of the root node.
    pub fn state(&self) -> State {
        self.arena[self.root].state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// State of any node, including nodes of expanded branches.
    pub fn node_state(&self, id: NodeId) -> Option<State> {
        self.arena.get(id).map(|node| node.state)
    }

    /// Finds the first node, depth-first from the root, carrying definition id `name`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .find(|&id| self.arena[id].name.as_deref() == Some(name))
    }

    /// Flattened view of every reachable node, depth-first from the root.
    pub fn inspect(&self) -> Vec<NodeDetails> {
        self.walk()
            .into_iter()
            .map(|id| {
                let node = &self.arena[id];
                NodeDetails {
                    id,
                    name: node.name.clone(),
                    parent: node.parent,
                    node_type: node.node_type(),
                    state: node.state,
                    args: describe_args(&node.kind),
                    attributes: node.attributes.clone(),
                }
            })
            .collect()
    }

    fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.arena[id].children().iter().rev());
        }
        order
    }
}

/// One row of [`Tree::inspect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetails {
    pub id: NodeId,
    /// Definition id, if the node has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub state: State,
    /// Node-specific arguments: call and args for leaves, counts for
    /// repeat and retry, weights for lotto, duration for wait.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub args: Value,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

fn describe_args(kind: &NodeKind) -> Value {
    match kind {
        NodeKind::Branch(branch) => json!({ "ref": branch.reference }),
        NodeKind::Lotto(lotto) => match &lotto.weights {
            Some(weights) => json!({ "weights": weights }),
            None => Value::Null,
        },
        NodeKind::Repeat(repeat) => json!({
            "iterations": repeat.bounds,
            "completed": repeat.completed,
        }),
        NodeKind::Retry(retry) => json!({
            "attempts": retry.bounds,
            "completed": retry.completed,
        }),
        NodeKind::Action(action) => json!({ "call": action.call, "args": action.args }),
        NodeKind::Condition(condition) => {
            json!({ "call": condition.call, "args": condition.args })
        }
        NodeKind::Wait(wait) => json!({
            "duration": wait.duration,
            "elapsedMs": u64::try_from(wait.elapsed.as_millis()).unwrap_or(u64::MAX),
        }),
        _ => Value::Null,
    }
}

/// Separates the main root from named roots.
fn split_roots(
    definition: &TreeDefinition,
) -> std::result::Result<(&NodeDefinition, HashMap<String, NodeDefinition>), DefinitionError> {
    let mut main = None;
    let mut subtrees = HashMap::new();

    let roots = match definition {
        TreeDefinition::Single(root) => {
            require_root(root)?;
            return Ok((root, subtrees));
        }
        TreeDefinition::Multiple(roots) => roots,
    };

    for root in roots {
        require_root(root)?;
        match &root.common().id {
            Some(name) => {
                if subtrees.insert(name.clone(), root.clone()).is_some() {
                    return Err(DefinitionError::DuplicateSubtree(name.clone()));
                }
            }
            None => {
                if main.replace(root).is_some() {
                    return Err(DefinitionError::MultipleMainRoots);
                }
            }
        }
    }

    let main = main.ok_or(DefinitionError::MissingMainRoot)?;
    Ok((main, subtrees))
}

fn require_root(definition: &NodeDefinition) -> std::result::Result<(), DefinitionError> {
    match definition {
        NodeDefinition::Root(_) => Ok(()),
        other => Err(DefinitionError::RootExpected {
            node_type: other.node_type(),
        }),
    }
}
